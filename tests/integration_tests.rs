//! Integration tests for rankstore
//!
//! Every test runs a full session over the in-memory store, so no Redis
//! server is needed.

use rankstore::config::SessionConfig;
use rankstore::error::{IngestError, StoreError};
use rankstore::query::RegionFilter;
use rankstore::store::{KeyValueStore, MemoryStore};
use rankstore::Session;
use std::io::{Cursor, Write};
use tempfile::{tempdir, NamedTempFile};

fn session() -> Session<MemoryStore> {
    Session::new(MemoryStore::new(), SessionConfig::default())
}

fn users_file(n: usize) -> String {
    (0..n)
        .map(|i| format!("\"user:{}\" \"email\" \"u{}@example.com\"\n", i, i))
        .collect()
}

#[tokio::test]
async fn test_user_round_trip_through_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "\"user:1\" \"first_name\" \"Ana\" \"last_name\" \"Li\"").unwrap();

    let session = session();
    let staged = session.load_users(file.path()).await.unwrap();
    assert_eq!(staged, 1);

    let fields = session.user_attributes("1").await.unwrap().unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields["first_name"], "Ana");
    assert_eq!(fields["last_name"], "Li");
}

#[tokio::test]
async fn test_partial_final_batch_is_flushed() {
    let session = session();
    let report = session
        .load_users_from(Cursor::new(users_file(250)))
        .await
        .unwrap();

    assert_eq!(report.staged, 250);
    assert_eq!(report.committed, 250);
    assert_eq!(report.batches, 3);
    assert_eq!(session.store().commit_sizes(), vec![100, 100, 50]);
    assert!(session.user_attributes("249").await.unwrap().is_some());
}

#[tokio::test]
async fn test_custom_batch_size() {
    let session = Session::new(MemoryStore::new(), SessionConfig::new(40, 10).unwrap());
    session
        .load_users_from(Cursor::new(users_file(100)))
        .await
        .unwrap();
    assert_eq!(session.store().commit_sizes(), vec![40, 40, 20]);
}

#[tokio::test]
async fn test_scores_and_top_emails() {
    let dir = tempdir().unwrap();
    let scores = dir.path().join("userscores.csv");
    std::fs::write(
        &scores,
        "user:id,leaderboard,score\n7,2,99.5\n8,2,10\n9,3,50\n",
    )
    .unwrap();

    let session = session();
    session
        .load_users_from(Cursor::new(
            "\"user:7\" \"email\" \"seven@example.com\"\n\
             \"user:8\" \"email\" \"eight@example.com\"\n\
             \"user:9\" \"email\" \"nine@example.com\"\n",
        ))
        .await
        .unwrap();
    assert_eq!(session.load_scores(&scores).await.unwrap(), 3);

    let top = session.top_player_emails().await.unwrap();
    let emails: Vec<&str> = top.iter().map(|r| r.email.as_str()).collect();
    assert_eq!(emails, vec!["seven@example.com", "eight@example.com"]);
    assert_eq!(top[0].score, 99.5);

    let other = session.top_emails("3", 10).await.unwrap();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].user_id, "9");
}

#[tokio::test]
async fn test_top_emails_never_exceed_ten() {
    let session = session();
    session
        .load_users_from(Cursor::new(users_file(30)))
        .await
        .unwrap();

    let mut csv = String::from("user:id,leaderboard,score\n");
    for i in 0..30 {
        csv.push_str(&format!("{},2,{}\n", i, i * 3));
    }
    session.load_scores_from(Cursor::new(csv)).await.unwrap();

    let top = session.top_player_emails().await.unwrap();
    assert_eq!(top.len(), 10);
    assert_eq!(top[0].user_id, "29");
    assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_queries_after_delete_all() {
    let session = session();
    session
        .load_users_from(Cursor::new(
            "\"user:2\" \"last_name\" \"Orlova\" \"gender\" \"female\" \
             \"country\" \"Russia\" \"latitude\" \"44\" \"longitude\" \"39\"\n",
        ))
        .await
        .unwrap();
    session
        .load_scores_from(Cursor::new("user:id,leaderboard,score\n2,2,1\n"))
        .await
        .unwrap();
    assert_eq!(session.regional_female_users().await.unwrap().len(), 1);

    session.delete_all().await.unwrap();
    assert!(session.store().is_empty());

    assert!(session.user_attributes("2").await.unwrap().is_none());
    assert!(session.user_coordinates("2").await.unwrap().is_none());
    assert!(session.even_prefixed_users_from(0).await.unwrap().keys.is_empty());
    assert!(session.even_prefixed_users().await.unwrap().keys.is_empty());
    assert!(session.regional_female_users().await.unwrap().is_empty());
    assert!(session.top_player_emails().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_failure_reports_progress() {
    let session = session();
    session.store().fail_commits_after(2);

    let err = session
        .load_users_from(Cursor::new(users_file(250)))
        .await
        .unwrap_err();

    match &err {
        IngestError::CommitFailed {
            dataset,
            committed,
            ..
        } => {
            assert_eq!(*dataset, "users");
            assert_eq!(*committed, 200);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(session.store().len(), 200);
}

#[tokio::test]
async fn test_connection_failure_surfaces() {
    let session = session();
    session.store().set_offline(true);

    let err = session.ping().await.unwrap_err();
    assert!(err.is_connection_failure());

    let err = session.user_attributes("1").await.unwrap_err();
    assert!(matches!(err, StoreError::ConnectionFailed { .. }));

    let err = session
        .load_users_from(Cursor::new(users_file(1)))
        .await
        .unwrap_err();
    assert_eq!(err.committed(), 0);
}

#[tokio::test]
async fn test_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = session()
        .load_scores(&dir.path().join("absent.csv"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Io { .. }));
}

#[tokio::test]
async fn test_region_latitude_boundaries() {
    let session = session();
    let line = |id: u32, lat: &str| {
        format!(
            "\"user:{}\" \"first_name\" \"F{}\" \"gender\" \"female\" \
             \"country\" \"China\" \"latitude\" \"{}\"\n",
            id, id, lat
        )
    };
    let input: String = [
        line(1, "40"),
        line(2, "46"),
        line(3, "39.999"),
        line(4, "46.001"),
    ]
    .concat();
    session.load_users_from(Cursor::new(input)).await.unwrap();

    let mut ids: Vec<String> = session
        .regional_female_users()
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["user:1", "user:2"]);

    let wider = RegionFilter {
        latitude: 39.0..=47.0,
        ..RegionFilter::default()
    };
    assert_eq!(session.users_matching(&wider).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_even_ids_from_start() {
    let session = session();
    session
        .load_users_from(Cursor::new(
            "\"user:2836\" \"last_name\" \"Ivanova\"\n\
             \"user:299\" \"last_name\" \"Smith\"\n\
             \"user:399\" \"last_name\" \"Jones\"\n\
             \"user:40\" \"first_name\" \"Noname\"\n",
        ))
        .await
        .unwrap();

    let users = session.even_prefixed_users_from(0).await.unwrap();
    let mut keys = users.keys.clone();
    keys.sort();
    assert_eq!(keys, vec!["user:2836", "user:299", "user:40"]);
    let mut last_names = users.last_names.clone();
    last_names.sort();
    assert_eq!(last_names, vec!["Ivanova", "Smith"]);
}

#[tokio::test]
async fn test_delete_keys_reports_existence() {
    let session = session();
    session
        .load_users_from(Cursor::new(users_file(2)))
        .await
        .unwrap();

    let removed = session
        .delete_keys(&["user:0".to_string(), "user:5".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, vec![true, false]);
    assert!(session.user_attributes("0").await.unwrap().is_none());
    assert!(session.store().hash_get("user:1", "email").await.unwrap().is_some());
}
