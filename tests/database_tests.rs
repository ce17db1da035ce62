//! Tests for the store layer: snapshot reads and the atomic write
//! primitives the engine's invariants depend on.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use argus::engine::outcome::{Outcome, OutcomeRecord};
use argus::server::database::Database;

async fn setup_db() -> (Arc<Database>, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("db connect failed");

    let db = Arc::new(Database::SQLite(pool.clone()));
    db.migrate().await.expect("migration failed");

    (db, pool)
}

async fn seed_team(pool: &SqlitePool) -> String {
    let team_id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query("INSERT INTO teams (id, name, created_at) VALUES ($1, 'Team', $2)")
        .bind(&team_id)
        .bind(now)
        .execute(pool)
        .await
        .expect("team insert failed");

    sqlx::query(
        "INSERT INTO team_settings \
         (team_id, strict_customers, strict_products, strict_releases, ip_limit_period, device_timeout_minutes) \
         VALUES ($1, 0, 0, 0, 'WEEK', 30)",
    )
    .bind(&team_id)
    .execute(pool)
    .await
    .expect("settings insert failed");

    team_id
}

async fn seed_license(pool: &SqlitePool, team_id: &str, lookup: &str) -> String {
    let license_id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        "INSERT INTO licenses \
         (id, team_id, license_key_lookup, license_key_encrypted, suspended, expiration_type, created_at) \
         VALUES ($1, $2, $3, 'encrypted', 0, 'NEVER', $4)",
    )
    .bind(&license_id)
    .bind(team_id)
    .bind(lookup)
    .bind(now)
    .execute(pool)
    .await
    .expect("license insert failed");

    license_id
}

fn log_record(team_id: &str, license_id: &str, ip: &str, created_at: NaiveDateTime) -> OutcomeRecord {
    OutcomeRecord {
        team_id: team_id.to_string(),
        license_id: Some(license_id.to_string()),
        license_key_lookup: Some("lookup".to_string()),
        customer_id: None,
        product_id: None,
        release_id: None,
        device_identifier: None,
        ip_address: Some(ip.to_string()),
        country: None,
        outcome: Outcome::Valid,
        created_at,
    }
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let (db, _pool) = setup_db().await;
    db.migrate().await.expect("second migration failed");
    assert!(db.ping().await);
    assert_eq!(db.db_type(), "sqlite");
}

#[tokio::test]
async fn team_snapshot_not_found() {
    let (db, _pool) = setup_db().await;
    let snapshot = db
        .load_team_snapshot(&Uuid::new_v4().to_string())
        .await
        .expect("read failed");
    assert!(snapshot.is_none());
}

#[tokio::test]
async fn team_snapshot_carries_settings_key_pair_and_blacklist() {
    let (db, pool) = setup_db().await;
    let team_id = seed_team(&pool).await;

    sqlx::query("INSERT INTO team_key_pairs (team_id, private_key, public_key) VALUES ($1, $2, $3)")
        .bind(&team_id)
        .bind(vec![1u8, 2, 3])
        .bind(vec![4u8, 5, 6])
        .execute(&pool)
        .await
        .unwrap();

    sqlx::query(
        "INSERT INTO blacklist (id, team_id, kind, value, hits) VALUES ($1, $2, 'COUNTRY', 'FI', 7)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&team_id)
    .execute(&pool)
    .await
    .unwrap();

    let snapshot = db
        .load_team_snapshot(&team_id)
        .await
        .expect("read failed")
        .expect("team missing");

    assert_eq!(snapshot.team.id, team_id);
    assert_eq!(snapshot.settings.ip_limit_period, "WEEK");
    assert_eq!(snapshot.settings.device_timeout_minutes, 30);
    assert_eq!(
        snapshot.key_pair.as_ref().map(|kp| kp.public_key.clone()),
        Some(vec![4u8, 5, 6])
    );
    assert_eq!(snapshot.blacklist.len(), 1);
    assert_eq!(snapshot.blacklist[0].hits, 7);
}

#[tokio::test]
async fn team_without_settings_row_is_an_error() {
    let (db, pool) = setup_db().await;
    let team_id = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO teams (id, name, created_at) VALUES ($1, 'Bare', $2)")
        .bind(&team_id)
        .bind(Utc::now().naive_utc())
        .execute(&pool)
        .await
        .unwrap();

    assert!(db.load_team_snapshot(&team_id).await.is_err());
}

#[tokio::test]
async fn license_snapshot_not_found() {
    let (db, pool) = setup_db().await;
    let team_id = seed_team(&pool).await;
    let cutoff = Utc::now().naive_utc() - Duration::days(1);

    let snapshot = db
        .load_license_snapshot(&team_id, "no-such-lookup", cutoff)
        .await
        .expect("read failed");
    assert!(snapshot.is_none());
}

#[tokio::test]
async fn license_snapshot_projects_associations_and_published_releases() {
    let (db, pool) = setup_db().await;
    let team_id = seed_team(&pool).await;
    let license_id = seed_license(&pool, &team_id, "lookup-1").await;

    let customer_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO customers (id, team_id, name) VALUES ($1, $2, 'Customer')")
        .bind(&customer_id)
        .bind(&team_id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO license_customers (license_id, customer_id) VALUES ($1, $2)")
        .bind(&license_id)
        .bind(&customer_id)
        .execute(&pool)
        .await
        .unwrap();

    let product_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO products (id, team_id, name) VALUES ($1, $2, 'Product')")
        .bind(&product_id)
        .bind(&team_id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO license_products (license_id, product_id) VALUES ($1, $2)")
        .bind(&license_id)
        .bind(&product_id)
        .execute(&pool)
        .await
        .unwrap();

    for (version, status) in [("1.0.0", "PUBLISHED"), ("2.0.0", "DRAFT")] {
        sqlx::query("INSERT INTO releases (id, product_id, version, status) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4().to_string())
            .bind(&product_id)
            .bind(version)
            .bind(status)
            .execute(&pool)
            .await
            .unwrap();
    }

    let cutoff = Utc::now().naive_utc() - Duration::days(1);
    let snapshot = db
        .load_license_snapshot(&team_id, "lookup-1", cutoff)
        .await
        .expect("read failed")
        .expect("license missing");

    assert_eq!(snapshot.license.id, license_id);
    assert_eq!(snapshot.customers.len(), 1);
    assert_eq!(snapshot.products.len(), 1);

    // Only the PUBLISHED release survives the projection
    assert_eq!(snapshot.products[0].releases.len(), 1);
    assert_eq!(snapshot.products[0].releases[0].version, "1.0.0");
}

#[tokio::test]
async fn recent_ips_respect_cutoff_and_status() {
    let (db, pool) = setup_db().await;
    let team_id = seed_team(&pool).await;
    let license_id = seed_license(&pool, &team_id, "lookup-ips").await;

    let now = Utc::now().naive_utc();

    // Inside the window, successful
    db.insert_request_log(&log_record(&team_id, &license_id, "198.51.100.1", now))
        .await
        .unwrap();
    // Inside the window, duplicate IP
    db.insert_request_log(&log_record(&team_id, &license_id, "198.51.100.1", now))
        .await
        .unwrap();
    // Outside the window
    db.insert_request_log(&log_record(
        &team_id,
        &license_id,
        "198.51.100.2",
        now - Duration::days(10),
    ))
    .await
    .unwrap();
    // Inside the window but rejected: occupies no slot
    let mut rejected = log_record(&team_id, &license_id, "198.51.100.3", now);
    rejected.outcome = Outcome::IpLimitReached;
    db.insert_request_log(&rejected).await.unwrap();

    let cutoff = now - Duration::days(7);
    let snapshot = db
        .load_license_snapshot(&team_id, "lookup-ips", cutoff)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(snapshot.recent_ips, vec!["198.51.100.1".to_string()]);
}

#[tokio::test]
async fn blacklist_hits_increment_atomically() {
    let (db, pool) = setup_db().await;
    let team_id = seed_team(&pool).await;

    let entry_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO blacklist (id, team_id, kind, value, hits) VALUES ($1, $2, 'IP_ADDRESS', '1.2.3.4', 0)",
    )
    .bind(&entry_id)
    .bind(&team_id)
    .execute(&pool)
    .await
    .unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let db = Arc::clone(&db);
        let entry_id = entry_id.clone();
        handles.push(tokio::spawn(async move {
            db.increment_blacklist_hits(&entry_id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("increment failed");
    }

    let hits: i64 = sqlx::query_scalar("SELECT hits FROM blacklist WHERE id = $1")
        .bind(&entry_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(hits, 10);
}

#[tokio::test]
async fn duration_activation_writes_exactly_once() {
    let (db, pool) = setup_db().await;
    let team_id = seed_team(&pool).await;
    let license_id = seed_license(&pool, &team_id, "lookup-duration").await;

    let now = Utc::now().naive_utc();

    // Concurrent racers with slightly different dates
    let mut handles = Vec::new();
    for offset in 0..5 {
        let db = Arc::clone(&db);
        let license_id = license_id.clone();
        let expires_at = now + Duration::days(30) + Duration::milliseconds(offset);
        handles.push(tokio::spawn(async move {
            db.activate_duration_expiration(&license_id, expires_at).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("activation failed");
    }

    let stored: Option<NaiveDateTime> =
        sqlx::query_scalar("SELECT expiration_date FROM licenses WHERE id = $1")
            .bind(&license_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    let stored = stored.expect("expiration date not set");

    // A later attempt cannot overwrite the stored date
    db.activate_duration_expiration(&license_id, now + Duration::days(90))
        .await
        .unwrap();

    let after: Option<NaiveDateTime> =
        sqlx::query_scalar("SELECT expiration_date FROM licenses WHERE id = $1")
            .bind(&license_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(after, Some(stored));
}

#[tokio::test]
async fn heartbeat_upsert_refreshes_without_duplicates() {
    let (db, pool) = setup_db().await;
    let team_id = seed_team(&pool).await;
    let license_id = seed_license(&pool, &team_id, "lookup-devices").await;

    let first_beat = Utc::now().naive_utc() - Duration::minutes(5);
    db.upsert_device_heartbeat(&license_id, "device-a", first_beat, Some("1.2.3.4"), None)
        .await
        .unwrap();

    let second_beat = Utc::now().naive_utc();
    let mut handles = Vec::new();
    for _ in 0..5 {
        let db = Arc::clone(&db);
        let license_id = license_id.clone();
        handles.push(tokio::spawn(async move {
            db.upsert_device_heartbeat(&license_id, "device-a", second_beat, Some("5.6.7.8"), Some("FI"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("upsert failed");
    }

    let rows: Vec<(String, NaiveDateTime, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT device_identifier, last_beat_at, ip_address, country FROM devices WHERE license_id = $1",
    )
    .bind(&license_id)
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "device-a");
    assert_eq!(rows[0].1, second_beat);
    assert_eq!(rows[0].2.as_deref(), Some("5.6.7.8"));
    assert_eq!(rows[0].3.as_deref(), Some("FI"));
}

#[tokio::test]
async fn request_log_is_append_only_per_attempt() {
    let (db, pool) = setup_db().await;
    let team_id = seed_team(&pool).await;
    let license_id = seed_license(&pool, &team_id, "lookup-log").await;

    let now = Utc::now().naive_utc();
    let mut record = log_record(&team_id, &license_id, "198.51.100.1", now);
    record.outcome = Outcome::LicenseExpired;
    db.insert_request_log(&record).await.unwrap();
    db.insert_request_log(&record).await.unwrap();

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, status_code FROM request_logs WHERE team_id = $1")
            .bind(&team_id)
            .fetch_all(&pool)
            .await
            .unwrap();

    assert_eq!(rows.len(), 2);
    for (status, status_code) in rows {
        assert_eq!(status, "LICENSE_EXPIRED");
        assert_eq!(status_code, 403);
    }
}
