//! Integration tests for the repository layer
//!
//! These run against a real PostgreSQL instance named by `DATABASE_URL` and
//! are skipped when it is not set. Every test works in its own collection.

use std::collections::HashMap;
use std::time::Duration;

use repohaus::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Post {
    title: String,
    score: i64,
}

async fn setup_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    Some(
        PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to database"),
    )
}

/// Fresh collection with its table created
async fn setup_collection(repo: &Repository, prefix: &str) -> Collection {
    let name = format!("{}_{}", prefix, Uuid::new_v4().simple());
    let collection = Collection::new(&name).expect("valid collection name");
    repo.session()
        .ensure_collection(&collection)
        .await
        .expect("Failed to create collection");
    collection
}

async fn cleanup(repo: &Repository, collection: &Collection) {
    let _ = repo.session().drop_collection(collection).await;
}

async fn save_post(
    session: &Session,
    collection: &Collection,
    owner: Uuid,
    title: &str,
    score: i64,
) -> Document {
    let document = Document::new(
        Uuid::new_v4(),
        owner,
        &Post {
            title: title.to_string(),
            score,
        },
    )
    .expect("valid document");
    session
        .insert(collection, &document)
        .await
        .expect("Failed to save post")
}

#[tokio::test]
async fn test_save_and_find_round_trip() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let session = repo.session();

    let id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let saved = session
        .save(
            &posts,
            id,
            owner,
            1_000,
            1_000,
            &json!({"title": "hello", "score": 3}),
        )
        .await?;
    assert_eq!(saved.id, id);

    let found = session.find_by_id(&posts, id).await?;
    assert_eq!(found.owner_id, owner);
    assert_eq!(found.created_at, 1_000);
    assert_eq!(
        found.decode::<Post>()?,
        Post {
            title: "hello".to_string(),
            score: 3
        }
    );

    let by_title = session
        .find(&posts, &where_attribute("title", "hello"), &FindOptions::new())
        .await?;
    assert_eq!(by_title.len(), 1);
    assert_eq!(session.count(&posts, &where_owner(owner)).await?, 1);

    // duplicate id is a conflict
    let duplicate = session
        .save(&posts, id, owner, 2_000, 2_000, &json!({"title": "again"}))
        .await
        .unwrap_err();
    assert_eq!(duplicate.code(), ErrorCode::Conflict);

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_ownership_mismatch_changes_nothing() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let session = repo.session();

    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let post = save_post(&session, &posts, owner, "mine", 10).await;

    let updates = UpdateSet::new().set("title", "stolen");
    let err = session
        .update_with_ownership(&posts, post.id, intruder, &updates)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = session
        .delete_with_ownership(&posts, post.id, intruder)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let unchanged = session.find_by_id(&posts, post.id).await?;
    assert_eq!(unchanged.attribute("title"), Some(&json!("mine")));
    assert_eq!(unchanged.updated_at, post.updated_at);

    let updated = session
        .update_with_ownership(&posts, post.id, owner, &updates)
        .await?;
    assert_eq!(updated.attribute("title"), Some(&json!("stolen")));
    assert_eq!(updated.attribute("score"), Some(&json!(10)));

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_delete_then_find_is_not_found() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let session = repo.session();

    let owner = Uuid::new_v4();
    let post = save_post(&session, &posts, owner, "short lived", 0).await;

    session.delete_with_ownership(&posts, post.id, owner).await?;
    let err = session.find_by_id(&posts, post.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_rolled_back_writes_are_invisible() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;

    let unit = repo.session().begin().await?;
    let post = save_post(unit.session(), &posts, Uuid::new_v4(), "draft", 1).await;
    assert!(unit.session().exists(&posts, &where_object_id(post.id)).await?);
    unit.rollback().await?;

    let outside = repo.session();
    assert!(!outside.exists(&posts, &where_object_id(post.id)).await?);
    assert_eq!(outside.count(&posts, &Query::new()).await?, 0);

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_user_votes_map_covers_every_comment() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let votes = setup_collection(&repo, "votes").await;
    let session = repo.session();

    let user = Uuid::new_v4();
    let other = Uuid::new_v4();
    let comments: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

    for (voter, comment) in [(user, comments[0]), (user, comments[2]), (other, comments[1])] {
        let vote =
            Document::new(Uuid::new_v4(), voter, &json!({"comment_id": comment, "value": 1}))?;
        session.insert(&votes, &vote).await?;
    }

    let result = session
        .get_user_votes_for_comments(&votes, &comments, user)
        .await?;
    let expected: HashMap<Uuid, bool> = HashMap::from([
        (comments[0], true),
        (comments[1], false),
        (comments[2], true),
        (comments[3], false),
    ]);
    assert_eq!(result, expected);

    let empty = session.get_user_votes_for_comments(&votes, &[], user).await?;
    assert!(empty.is_empty());

    cleanup(&repo, &votes).await;
    Ok(())
}

#[tokio::test]
async fn test_read_committed_increment_sees_committed_value() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let owner = Uuid::new_v4();
    let post = save_post(&repo.session(), &posts, owner, "contested", 100).await;

    let read_committed =
        PartialTransactionConfig::default().isolation_level(IsolationLevel::ReadCommitted);
    let first = repo.session().begin_with_config(Some(&read_committed)).await?;
    let second = repo.session().begin_with_config(Some(&read_committed)).await?;

    let setter = async {
        first
            .session()
            .update_with_ownership(&posts, post.id, owner, &UpdateSet::new().set("score", 200))
            .await?;
        // hold the row lock while the increment queues up behind it
        tokio::time::sleep(Duration::from_millis(200)).await;
        first.commit().await?;
        Ok::<_, RepositoryError>(())
    };
    let incrementer = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let bump = UpdateSet::new().increment("score", 50);
        second.session().increment_with_ownership(&posts, post.id, owner, &bump).await?;
        second.commit().await?;
        Ok::<_, RepositoryError>(())
    };
    let (set, increment) = tokio::join!(setter, incrementer);
    set?;
    increment?;

    let stored = repo.session().find_by_id(&posts, post.id).await?;
    assert_eq!(stored.attribute("score"), Some(&json!(250)));

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_set_then_increment_in_one_transaction() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let owner = Uuid::new_v4();
    let read_committed =
        PartialTransactionConfig::default().isolation_level(IsolationLevel::ReadCommitted);

    let seed = repo.session().begin_with_config(Some(&read_committed)).await?;
    let post = save_post(seed.session(), &posts, owner, "counter", 100).await;
    seed.commit().await?;

    let unit = repo.session().begin_with_config(Some(&read_committed)).await?;
    let session = unit.session();
    session
        .update_with_ownership(&posts, post.id, owner, &UpdateSet::new().set("score", 200))
        .await?;
    session
        .increment_with_ownership(&posts, post.id, owner, &UpdateSet::new().increment("score", 50))
        .await?;
    let metrics = unit.commit().await?.expect("unit owns its transaction");
    assert_eq!(metrics.operations_count, 2);
    assert_eq!(metrics.isolation_level, IsolationLevel::ReadCommitted);

    let stored = repo.session().find_by_id(&posts, post.id).await?;
    assert_eq!(stored.attribute("score"), Some(&json!(250)));

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_rolled_back_index_creation_leaves_no_collection() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let name = format!("tagged_{}", Uuid::new_v4().simple());
    let tagged = Collection::new(&name)?;

    let unit = repo.session().begin().await?;
    let index = unit
        .session()
        .create_index(&tagged, &IndexSpec::new().attribute("tag", None, SortOrder::Asc))
        .await?;
    assert!(index.starts_with(&name));
    unit.rollback().await?;

    let err = repo
        .session()
        .find(&tagged, &Query::new(), &FindOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    Ok(())
}

#[tokio::test]
async fn test_cursor_pagination_walks_every_row_once() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let session = repo.session();

    let owner = Uuid::new_v4();
    let documents: Vec<Document> = (0..5)
        .map(|i| Document {
            id: Uuid::new_v4(),
            owner_id: owner,
            created_at: 1_000 + i,
            updated_at: 1_000 + i,
            data: json!({"title": format!("post {i}"), "score": i}),
        })
        .collect();
    assert_eq!(session.save_many(&posts, &documents).await?, 5);

    let mut seen = Vec::new();
    let mut request = PageRequest::new(2).with_total();
    let mut pages = 0;
    loop {
        let page = session.find_page(&posts, &where_owner(owner), &request).await?;
        pages += 1;
        assert_eq!(page.total, Some(5));
        seen.extend(page.items.iter().map(|doc| doc.created_at));
        match page.next_cursor {
            Some(cursor) => {
                assert!(page.has_next);
                request = PageRequest::new(2).with_total().after(cursor);
            }
            None => {
                assert!(!page.has_next);
                break;
            }
        }
    }
    assert_eq!(pages, 3);
    assert_eq!(seen, vec![1_004, 1_003, 1_002, 1_001, 1_000]);

    // a cursor only resumes the ordering it came from
    let first = session
        .find_page(&posts, &where_owner(owner), &PageRequest::new(2))
        .await?;
    let cursor = first.next_cursor.expect("more pages");
    let err = session
        .find_page(
            &posts,
            &where_owner(owner),
            &PageRequest::new(2)
                .sorted_by(SortKey::column("created_at", SortOrder::Asc))
                .after(cursor),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_second_commit_is_rejected() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let ctx = OperationContext::background();

    let transaction = repo.begin(&ctx).await?;
    let metrics = transaction.commit().await?;
    assert_eq!(metrics.transaction_id, transaction.transaction_id());
    assert!(!transaction.is_active());

    let err = transaction.commit().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::TransactionInactive);
    let err = transaction.rollback().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::TransactionInactive);
    Ok(())
}

#[tokio::test]
async fn test_joined_unit_defers_to_outer_transaction() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;

    let outer = repo.session().begin().await?;
    let inner = outer.session().begin().await?;
    assert!(inner.is_joined());
    let post = save_post(inner.session(), &posts, Uuid::new_v4(), "nested", 0).await;
    assert_eq!(inner.commit().await?, None);

    // nothing is visible until the owner commits
    assert!(!repo.session().exists(&posts, &where_object_id(post.id)).await?);
    assert!(outer.commit().await?.is_some());
    assert!(repo.session().exists(&posts, &where_object_id(post.id)).await?);

    // a serializable unit cannot join a weaker transaction
    let weak = repo
        .session()
        .begin_with_config(Some(
            &PartialTransactionConfig::default().isolation_level(IsolationLevel::ReadCommitted),
        ))
        .await?;
    let err = weak
        .session()
        .begin_with_config(Some(
            &PartialTransactionConfig::default().isolation_level(IsolationLevel::Serializable),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
    weak.rollback().await?;

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_run_in_transaction_commits_and_rolls_back() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let ctx = OperationContext::with_timeout(Duration::from_secs(10));
    let owner = Uuid::new_v4();

    let coll = &posts;
    let saved = repo
        .run_in_transaction(&ctx, None, move |session| async move {
            let post = Document::new(Uuid::new_v4(), owner, &json!({"title": "kept"}))?;
            session.insert(coll, &post).await
        })
        .await?;
    assert!(repo.session().exists(&posts, &where_object_id(saved.id)).await?);

    let mut attempts = 0;
    let result: Result<(), RepositoryError> = repo
        .run_in_transaction(&ctx, None, |session| {
            attempts += 1;
            async move {
                let post = Document::new(Uuid::new_v4(), owner, &json!({"title": "dropped"}))?;
                session.insert(coll, &post).await?;
                Err(RepositoryError::validation("changed my mind"))
            }
        })
        .await;
    assert_eq!(result.unwrap_err().code(), ErrorCode::Validation);
    // validation failures are not retried
    assert_eq!(attempts, 1);
    assert_eq!(repo.session().count(&posts, &where_owner(owner)).await?, 1);

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_nested_updates_create_missing_parents() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let session = repo.session();

    let owner = Uuid::new_v4();
    let post = Document::new(Uuid::new_v4(), owner, &json!({"title": "t"}))?;
    session.insert(&posts, &post).await?;

    let vote = UpdateSet::new().increment("stats.votes", 1);
    let bumped = session.increment_with_ownership(&posts, post.id, owner, &vote).await?;
    assert_eq!(bumped.data["stats"]["votes"], json!(1));

    session
        .update_with_ownership(&posts, post.id, owner, &UpdateSet::new().set("profile.bio", "hi"))
        .await?;
    let votes = UpdateSet::new().increment("stats.votes", 2);
    session.increment_with_ownership(&posts, post.id, owner, &votes).await?;

    let stored = session.find_by_id(&posts, post.id).await?;
    assert_eq!(
        stored.data,
        json!({"title": "t", "stats": {"votes": 3}, "profile": {"bio": "hi"}})
    );

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_attribute_pages_include_rows_without_the_attribute() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;
    let session = repo.session();

    let owner = Uuid::new_v4();
    let payloads = [
        json!({"score": 3}),
        json!({"title": "unscored"}),
        json!({"score": 1}),
        json!({"title": "also unscored"}),
        json!({"score": 2}),
    ];
    let mut unscored = Vec::new();
    for payload in &payloads {
        let doc = session
            .insert(&posts, &Document::new(Uuid::new_v4(), owner, payload)?)
            .await?;
        if doc.attribute("score").is_none() {
            unscored.push(doc.id);
        }
    }
    unscored.sort();

    let sort = SortKey::attribute("score", SortOrder::Asc).with_cast("bigint");
    let mut request = PageRequest::new(2).with_total().sorted_by(sort.clone());
    let mut walked = Vec::new();
    loop {
        let page = session.find_page(&posts, &where_owner(owner), &request).await?;
        assert_eq!(page.total, Some(5));
        walked.extend(page.items);
        match page.next_cursor {
            Some(cursor) => {
                request = PageRequest::new(2)
                    .with_total()
                    .sorted_by(sort.clone())
                    .after(cursor)
            }
            None => break,
        }
    }

    assert_eq!(walked.len(), 5);
    let scores: Vec<Option<&Value>> = walked.iter().map(|doc| doc.attribute("score")).collect();
    assert_eq!(
        scores[..3],
        [Some(&json!(1)), Some(&json!(2)), Some(&json!(3))]
    );
    let tail: Vec<Uuid> = walked[3..].iter().map(|doc| doc.id).collect();
    assert_eq!(tail, unscored);

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_expired_transaction_stays_open_until_rolled_back() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let repo = Repository::new(pool);
    let posts = setup_collection(&repo, "posts").await;

    let short = PartialTransactionConfig::default().timeout(Duration::from_millis(300));
    let unit = repo.session().begin_with_config(Some(&short)).await?;
    save_post(unit.session(), &posts, Uuid::new_v4(), "late", 0).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let err = unit
        .session()
        .count(&posts, &Query::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(unit.transaction().is_active());

    let err = unit.transaction().commit().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert_eq!(unit.transaction().status(), TransactionStatus::Active);

    let metrics = unit.rollback().await?;
    assert_eq!(metrics.status, TransactionStatus::RolledBack);
    assert_eq!(repo.session().count(&posts, &Query::new()).await?, 0);

    cleanup(&repo, &posts).await;
    Ok(())
}

#[tokio::test]
async fn test_migration_creates_declared_indexes() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await else {
        return Ok(());
    };
    let mut repohaus = RepoHaus::from_pool(pool.clone(), TransactionConfig::default())?;

    let name = format!("ranked_{}", Uuid::new_v4().simple());
    let posts = Collection::new(&name)?
        .with_attributes(["score"])
        .with_index(IndexSpec::new().attribute("score", Some("bigint"), SortOrder::Desc));
    let index_name = posts.indexes()[0].index_name(&posts)?;

    repohaus.register_collection_with_migration(posts.clone(), false).await?;
    assert!(repohaus.collection(&name).is_ok());

    let found: Option<String> = sqlx::query_scalar(
        "SELECT indexname::text FROM pg_indexes WHERE tablename = $1 AND indexname = $2",
    )
    .bind(&name)
    .bind(&index_name)
    .fetch_optional(&pool)
    .await?;
    assert_eq!(found, Some(index_name));

    // a second bootstrap with recreate drops and rebuilds the table
    repohaus.migrate_collection(&posts, true).await?;
    assert_eq!(repohaus.session().count(&posts, &Query::new()).await?, 0);

    cleanup(repohaus.repository(), &posts).await;
    Ok(())
}
