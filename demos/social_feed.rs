//! # Social Feed Example
//!
//! Walks through the repository layer with a tiny social network:
//! - Posts, comments and votes stored as owned documents
//! - Ownership-checked edits and atomic score increments
//! - One-round-trip "did this user vote" lookups
//! - Cursor pagination over a feed
//! - Retried transactions
//!
//! Needs a PostgreSQL database named `repohaus` on localhost.

use std::time::Duration;

use repohaus::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("📣 RepoHaus Social Feed Example");
    println!("==============================");

    // 1. Database setup
    let config = DatabaseConfig::new(
        "localhost".to_string(),
        5432,
        "repohaus".to_string(),
        "postgres".to_string(),
        "password".to_string(),
        1,
        10,
        30,
        600,
        3600,
    );
    let mut repohaus = RepoHaus::new(config).await?;

    let posts = Collection::new("feed_posts")?
        .with_attributes(["title", "body", "score", "tags"])
        .with_index(IndexSpec::new().attribute("score", Some("bigint"), SortOrder::Desc));
    let comments = Collection::new("feed_comments")?.with_attributes(["post_id", "body", "score"]);
    let votes = Collection::new("feed_votes")?.with_attributes(["comment_id", "value"]);

    repohaus.register_collection_with_migration(posts.clone(), true).await?;
    repohaus.register_collection_with_migration(comments.clone(), true).await?;
    repohaus.register_collection_with_migration(votes.clone(), true).await?;
    println!("✅ Collections ready: {:?}", repohaus.list_collections());

    let session = repohaus.session();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    // 2. Posts
    let mut feed = Vec::new();
    for i in 0..5 {
        let post = Document::new(
            Uuid::new_v4(),
            alice,
            &json!({"title": format!("Post #{i}"), "body": "hello", "score": 0, "tags": ["intro"]}),
        )?;
        feed.push(session.insert(&posts, &post).await?);
    }
    println!("📝 Alice wrote {} posts", feed.len());

    // 3. Ownership-checked edits
    let first = &feed[0];
    match session
        .update_with_ownership(&posts, first.id, bob, &UpdateSet::new().set("title", "hijacked"))
        .await
    {
        Err(e) if e.is(ErrorCode::NotFound) => println!("🔒 Bob cannot edit Alice's post"),
        other => println!("⚠️ Unexpected result: {:?}", other.map(|doc| doc.id)),
    }

    let rename = UpdateSet::new().set("title", "Post #0 (edited)");
    let edited = session.update_with_ownership(&posts, first.id, alice, &rename).await?;
    println!("✏️ Alice renamed her post to {}", edited.data["title"]);

    let bumped = session
        .increment_with_ownership(&posts, first.id, alice, &UpdateSet::new().increment("score", 5))
        .await?;
    println!("📈 Score is now {}", bumped.data["score"]);

    // 4. Comments and votes
    let mut comment_ids = Vec::new();
    for body in ["First!", "Nice post", "Agreed"] {
        let comment = Document::new(
            Uuid::new_v4(),
            bob,
            &json!({"post_id": first.id, "body": body, "score": 0}),
        )?;
        comment_ids.push(session.insert(&comments, &comment).await?.id);
    }

    let vote =
        Document::new(Uuid::new_v4(), alice, &json!({"comment_id": comment_ids[1], "value": 1}))?;
    session.insert(&votes, &vote).await?;

    let voted = session
        .get_user_votes_for_comments(&votes, &comment_ids, alice)
        .await?;
    for id in &comment_ids {
        println!("🗳️ Alice voted on {}: {}", id, voted[id]);
    }

    // 5. Feed pagination
    let mut request = PageRequest::new(2).with_total();
    let mut page_number = 1;
    loop {
        let page = session.find_page(&posts, &where_owner(alice), &request).await?;
        let titles: Vec<_> = page.items.iter().map(|doc| doc.data["title"].clone()).collect();
        println!("📄 Page {} of {:?} posts: {:?}", page_number, page.total, titles);
        match page.next_cursor {
            Some(cursor) => request = PageRequest::new(2).with_total().after(cursor),
            None => break,
        }
        page_number += 1;
    }

    // 6. A vote and its score bump commit together or not at all
    let ctx = OperationContext::with_timeout(Duration::from_secs(10));
    let target = comment_ids[0];
    let (votes_ref, comments_ref) = (&votes, &comments);
    let scored = repohaus
        .repository()
        .run_in_transaction(&ctx, None, move |tx| async move {
            let vote =
                Document::new(Uuid::new_v4(), alice, &json!({"comment_id": target, "value": 1}))?;
            tx.insert(votes_ref, &vote).await?;
            let bump = UpdateSet::new().increment("score", 1);
            tx.increment_with_ownership(comments_ref, target, bob, &bump).await
        })
        .await?;
    println!("👍 Comment {} now scores {}", scored.id, scored.data["score"]);

    // 7. Cleanup
    let removed = session.delete_many(&votes, &where_owner(alice)).await?;
    println!("🧹 Removed {} votes", removed);
    repohaus.health_check().await?;
    println!("🎉 Done");

    Ok(())
}
