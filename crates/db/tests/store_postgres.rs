use assert_matches::assert_matches;
use chrono::Utc;
use firewatch_core::chat::NewChatMessage;
use firewatch_core::filter::{IncidentFilter, MessageFilter, SortOrder};
use firewatch_core::incident::{Incident, IncidentStatus};
use firewatch_core::profile::Profile;
use firewatch_core::roles::Role;
use firewatch_db::models::dispatcher::CreateDispatcher;
use firewatch_db::repositories::DispatcherRepo;
use firewatch_db::{PgStore, RecordStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

fn new_incident(reporter: Uuid) -> Incident {
    let now = Utc::now();
    Incident {
        id: Uuid::new_v4(),
        status: IncidentStatus::Pending,
        reported_by: reporter,
        dispatcher_id: None,
        station_id: None,
        incident_type: "fire".into(),
        description: "Kitchen fire".into(),
        priority: "high".into(),
        location: "4 Oak Ave".into(),
        media_urls: vec!["https://cdn.example.com/a.jpg".into()],
        created_at: now,
        updated_at: now,
    }
}

fn new_profile(email: &str) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        email: email.into(),
        full_name: "Sam Reporter".into(),
        phone: Some("555-0100".into()),
        role: Role::User,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_incident_insert_and_get(pool: PgPool) {
    let store = PgStore::new(pool);
    let incident = new_incident(Uuid::new_v4());
    store.insert_incident(&incident).await.unwrap();

    let found = store.get_incident(incident.id).await.unwrap().unwrap();
    assert_eq!(found.status, IncidentStatus::Pending);
    assert_eq!(found.incident_type, "fire");
    assert_eq!(found.media_urls.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_guarded_update_only_one_winner(pool: PgPool) {
    let store = PgStore::new(pool);
    let incident = store
        .insert_incident(&new_incident(Uuid::new_v4()))
        .await
        .unwrap();

    let mut approved = incident.clone();
    approved.status = IncidentStatus::InProgress;
    approved.dispatcher_id = Some(Uuid::new_v4());
    approved.updated_at = incident.updated_at + chrono::Duration::seconds(1);

    let mut other = approved.clone();
    other.dispatcher_id = Some(Uuid::new_v4());

    let (a, b) = tokio::join!(
        store.update_incident(&approved, IncidentStatus::Pending),
        store.update_incident(&other, IncidentStatus::Pending),
    );
    assert!(a.is_ok() != b.is_ok(), "exactly one update must win");
    let loser = if a.is_ok() { b } else { a };
    assert_matches!(loser, Err(StoreError::StatusMismatch { .. }));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_missing_incident_is_not_found(pool: PgPool) {
    let store = PgStore::new(pool);
    let err = store
        .update_incident(&new_incident(Uuid::new_v4()), IncidentStatus::Pending)
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::NotFound { .. });
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_in_progress_requires_dispatcher(pool: PgPool) {
    let store = PgStore::new(pool);
    let incident = store
        .insert_incident(&new_incident(Uuid::new_v4()))
        .await
        .unwrap();

    let mut bad = incident.clone();
    bad.status = IncidentStatus::InProgress;
    bad.updated_at = incident.updated_at + chrono::Duration::seconds(1);
    let err = store
        .update_incident(&bad, IncidentStatus::Pending)
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Database(_));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_query_incidents_by_status_and_reporter(pool: PgPool) {
    let store = PgStore::new(pool);
    let reporter = Uuid::new_v4();
    let mine = store.insert_incident(&new_incident(reporter)).await.unwrap();
    store
        .insert_incident(&new_incident(Uuid::new_v4()))
        .await
        .unwrap();

    let filter = IncidentFilter::any()
        .with_status(IncidentStatus::Pending)
        .reported_by(reporter);
    let found = store
        .query_incidents(&filter, SortOrder::Asc)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, mine.id);

    let none = store
        .query_incidents(
            &IncidentFilter::any().with_status(IncidentStatus::Resolved),
            SortOrder::Asc,
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_messages_ordered_by_created_at(pool: PgPool) {
    let store = PgStore::new(pool);
    let profile = store
        .insert_profile(&new_profile("sam@example.com"))
        .await
        .unwrap();
    let incident = store
        .insert_incident(&new_incident(profile.id))
        .await
        .unwrap();

    for text in ["one", "two", "three"] {
        store
            .insert_message(&NewChatMessage {
                incident_id: incident.id,
                sender_id: profile.id,
                message: text.into(),
            })
            .await
            .unwrap();
    }

    let asc = store
        .query_messages(&MessageFilter::for_incident(incident.id), SortOrder::Asc)
        .await
        .unwrap();
    let texts: Vec<_> = asc.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(texts, ["one", "two", "three"]);

    let desc = store
        .query_messages(&MessageFilter::for_incident(incident.id), SortOrder::Desc)
        .await
        .unwrap();
    assert_eq!(desc[0].message, "three");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_message_requires_profile(pool: PgPool) {
    let store = PgStore::new(pool);
    let incident = store
        .insert_incident(&new_incident(Uuid::new_v4()))
        .await
        .unwrap();
    let err = store
        .insert_message(&NewChatMessage {
            incident_id: incident.id,
            sender_id: Uuid::new_v4(),
            message: "orphan".into(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Database(_));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_profile_is_conflict(pool: PgPool) {
    let store = PgStore::new(pool);
    store
        .insert_profile(&new_profile("dup@example.com"))
        .await
        .unwrap();
    let err = store
        .insert_profile(&new_profile("dup@example.com"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_rekey_profile_carries_messages(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let old = store
        .insert_profile(&new_profile("move@example.com"))
        .await
        .unwrap();
    let incident = store.insert_incident(&new_incident(old.id)).await.unwrap();
    store
        .insert_message(&NewChatMessage {
            incident_id: incident.id,
            sender_id: old.id,
            message: "before".into(),
        })
        .await
        .unwrap();

    let moved = Profile {
        id: Uuid::new_v4(),
        ..old.clone()
    };
    let result = store.rekey_profile(old.id, &moved).await.unwrap();
    assert_eq!(result.map(|p| p.id), Some(moved.id));

    let messages = store
        .query_messages(&MessageFilter::for_incident(incident.id), SortOrder::Asc)
        .await
        .unwrap();
    assert_eq!(messages[0].sender_id, moved.id);

    let found = store
        .find_profile_by_email("MOVE@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, moved.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_find_dispatcher_by_user(pool: PgPool) {
    let user_id = Uuid::new_v4();
    let created = DispatcherRepo::create(
        &pool,
        &CreateDispatcher {
            user_id: Some(user_id),
            email: "disp@example.com".into(),
            full_name: Some("Dana Dispatch".into()),
            station_id: Some(Uuid::new_v4()),
            region: Some("north".into()),
        },
    )
    .await
    .unwrap();

    let store = PgStore::new(pool.clone());
    let found = store.find_dispatcher_by_user(user_id).await.unwrap().unwrap();
    assert_eq!(found.id, created.id);
    assert!(found.is_active);

    assert!(DispatcherRepo::set_active(&pool, created.id, false).await.unwrap());
    let found = store.find_dispatcher_by_user(user_id).await.unwrap().unwrap();
    assert!(!found.is_active);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_message_refused_on_closed_incident(pool: PgPool) {
    let store = PgStore::new(pool);
    let profile = store
        .insert_profile(&new_profile("late@example.com"))
        .await
        .unwrap();
    let cancelled = Incident {
        status: IncidentStatus::Cancelled,
        ..new_incident(profile.id)
    };
    let incident = store.insert_incident(&cancelled).await.unwrap();

    let err = store
        .insert_message(&NewChatMessage {
            incident_id: incident.id,
            sender_id: profile.id,
            message: "anyone there?".into(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::IncidentClosed { id } if id == incident.id);

    let err = store
        .insert_message(&NewChatMessage {
            incident_id: Uuid::new_v4(),
            sender_id: profile.id,
            message: "lost".into(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::NotFound { entity: "Incident", .. });
}
