use serde_json::json;
use uuid::Uuid;

use super::*;
use crate::collection::Collection;
use crate::document::Document;
use crate::errors::ErrorCode;

fn posts() -> Collection {
    Collection::new("posts").unwrap()
}

// ========================================
// WHERE rendering
// ========================================

#[test]
fn test_select_with_conditions_groups_and_ordering() {
    let owner = Uuid::new_v4();
    let query = Query::new()
        .and(Field::eq("owner_id", owner.to_string()))
        .and(Field::gt("score", 10).semi_structured().cast("bigint"))
        .or_any(vec![
            Field::eq("status", "open").semi_structured(),
            Field::eq("status", "pinned").semi_structured(),
        ]);
    let options = FindOptions::new()
        .sort_by("created_at", SortOrder::Desc)
        .limit(20)
        .skip(40);

    let stmt = SqlGenerator::build_select(&posts(), &query, &options).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT id, owner_id, created_at, updated_at, data FROM posts \
         WHERE owner_id = $1 AND (data->>'score')::bigint > $2 \
         AND (data->>'status' = $3 OR data->>'status' = $4) \
         ORDER BY created_at DESC, id ASC LIMIT 20 OFFSET 40"
    );
    assert_eq!(
        stmt.params,
        vec![
            SqlParam::Uuid(owner),
            SqlParam::BigInt(10),
            SqlParam::Text("open".to_string()),
            SqlParam::Text("pinned".to_string()),
        ]
    );
}

#[test]
fn test_empty_query_matches_everything() {
    let stmt = SqlGenerator::build_select(&posts(), &Query::new(), &FindOptions::new()).unwrap();
    assert_eq!(stmt.sql, "SELECT id, owner_id, created_at, updated_at, data FROM posts");
    assert!(stmt.params.is_empty());

    let query = Query::new().or_any(vec![]);
    assert!(query.is_empty());
    let stmt = SqlGenerator::build_count(&posts(), &query).unwrap();
    assert_eq!(stmt.sql, "SELECT COUNT(*) FROM posts");
}

#[test]
fn test_null_comparisons() {
    let query = Query::new()
        .and(Field::eq("deleted_at", json!(null)).semi_structured())
        .and(Field::ne("title", json!(null)).semi_structured());
    let stmt = SqlGenerator::build_count(&posts(), &query).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT COUNT(*) FROM posts WHERE data->>'deleted_at' IS NULL AND data->>'title' IS NOT NULL"
    );

    let query = Query::new().and(Field::gt("score", json!(null)).semi_structured());
    let err = SqlGenerator::build_count(&posts(), &query).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
}

#[test]
fn test_in_and_any() {
    let query = Query::new()
        .and(Field::in_values("status", vec![json!("a"), json!("b")]).semi_structured());
    let stmt = SqlGenerator::build_count(&posts(), &query).unwrap();
    assert_eq!(stmt.sql, "SELECT COUNT(*) FROM posts WHERE data->>'status' IN ($1, $2)");

    let query = Query::new().and(Field::in_values("status", vec![]).semi_structured());
    let stmt = SqlGenerator::build_count(&posts(), &query).unwrap();
    assert_eq!(stmt.sql, "SELECT COUNT(*) FROM posts WHERE 1=0");
    assert!(stmt.params.is_empty());

    let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
    let stmt = SqlGenerator::build_count(&posts(), &where_object_ids(&ids)).unwrap();
    assert_eq!(stmt.sql, "SELECT COUNT(*) FROM posts WHERE id = ANY($1)");
    assert_eq!(stmt.params, vec![SqlParam::UuidArray(ids)]);
}

#[test]
fn test_ilike_on_non_text_column_casts() {
    let query = Query::new().and(Field::ilike("id", "abc%"));
    let stmt = SqlGenerator::build_count(&posts(), &query).unwrap();
    assert_eq!(stmt.sql, "SELECT COUNT(*) FROM posts WHERE (id)::text ILIKE $1");

    let stmt = SqlGenerator::build_count(&posts(), &search_attribute("title", "rust")).unwrap();
    assert_eq!(stmt.sql, "SELECT COUNT(*) FROM posts WHERE data->>'title' ILIKE $1");
    assert_eq!(stmt.params, vec![SqlParam::Text("%rust%".to_string())]);
}

#[test]
fn test_text_params_are_cast_for_typed_targets() {
    let query = Query::new().and(
        Field::gt("published_at", "2024-01-01T00:00:00Z")
            .semi_structured()
            .cast("timestamptz"),
    );
    let stmt = SqlGenerator::build_count(&posts(), &query).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT COUNT(*) FROM posts WHERE (data->>'published_at')::timestamptz > $1::timestamptz"
    );
}

#[test]
fn test_field_validation() {
    // attribute names must be flagged semi-structured
    let query = Query::new().and(Field::eq("title", "x"));
    let err = SqlGenerator::build_count(&posts(), &query).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);

    // injection through attribute path
    let query = Query::new().and(Field::eq("title'--", "x").semi_structured());
    assert!(SqlGenerator::build_count(&posts(), &query).is_err());

    // casts only on attributes, and only known ones
    let query = Query::new().and(Field::eq("created_at", 1).cast("bigint"));
    assert!(SqlGenerator::build_count(&posts(), &query).is_err());
    let query = Query::new().and(Field::eq("score", 1).semi_structured().cast("bigint; --"));
    assert!(SqlGenerator::build_count(&posts(), &query).is_err());

    // typed column rejects malformed values
    let query = Query::new().and(Field::eq("owner_id", "not-a-uuid"));
    assert_eq!(
        SqlGenerator::build_count(&posts(), &query).unwrap_err().code(),
        ErrorCode::Validation
    );
}

#[test]
fn test_order_clause() {
    assert_eq!(SqlGenerator::build_order_clause(&[]).unwrap(), "");
    assert_eq!(
        SqlGenerator::build_order_clause(&[SortKey::column("id", SortOrder::Desc)]).unwrap(),
        " ORDER BY id DESC"
    );
    assert_eq!(
        SqlGenerator::build_order_clause(&[
            SortKey::attribute("score", SortOrder::Desc).with_cast("numeric"),
            SortKey::column("created_at", SortOrder::Asc),
        ])
        .unwrap(),
        " ORDER BY (data->>'score')::numeric DESC, created_at ASC, id ASC"
    );
}

#[test]
fn test_find_options_validation() {
    let err = SqlGenerator::build_select(&posts(), &Query::new(), &FindOptions::new().limit(-1))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(SortOrder::from_direction(-1), SortOrder::Desc);
    assert_eq!(SortOrder::from_direction(1), SortOrder::Asc);
}

// ========================================
// Mutations
// ========================================

#[test]
fn test_update_many_renders_set_then_where() {
    let owner = Uuid::new_v4();
    let updates = UpdateSet::new().set("title", "x").increment("score", 5);
    let stmt = SqlGenerator::build_update_many(&posts(), &where_owner(owner), &updates).unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE posts SET data = jsonb_set(jsonb_set(data, '{title}', $1::jsonb, true), \
         '{score}', to_jsonb(COALESCE((data->>'score')::numeric, 0) + $2), true), \
         updated_at = $3 WHERE owner_id = $4"
    );
    assert_eq!(stmt.params.len(), 4);
    assert_eq!(stmt.params[0], SqlParam::Json(json!("x")));
    assert_eq!(stmt.params[1], SqlParam::BigInt(5));
    assert!(matches!(stmt.params[2], SqlParam::BigInt(_)));
    assert_eq!(stmt.params[3], SqlParam::Uuid(owner));
}

#[test]
fn test_update_first_locks_one_row() {
    let updates = UpdateSet::new().set("title", "x");
    let stmt = SqlGenerator::build_update_first(&posts(), &Query::new(), &updates).unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE posts SET data = jsonb_set(data, '{title}', $1::jsonb, true), updated_at = $2 \
         WHERE id = (SELECT id FROM posts ORDER BY created_at ASC, id ASC LIMIT 1 FOR UPDATE) \
         RETURNING id, owner_id, created_at, updated_at, data"
    );
}

#[test]
fn test_owned_mutations() {
    let comments = Collection::new("comments").unwrap().with_attributes(["text", "score"]);
    let (id, owner) = (Uuid::new_v4(), Uuid::new_v4());

    let increment = UpdateSet::new().increment("score", 1);
    let stmt = SqlGenerator::build_owned_update(&comments, id, owner, &increment).unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE comments SET data = jsonb_set(data, '{score}', \
         to_jsonb(COALESCE((data->>'score')::numeric, 0) + $1), true), updated_at = $2 \
         WHERE id = $3 AND owner_id = $4 RETURNING id, owner_id, created_at, updated_at, data"
    );
    assert_eq!(stmt.params[2], SqlParam::Uuid(id));
    assert_eq!(stmt.params[3], SqlParam::Uuid(owner));

    let stmt = SqlGenerator::build_owned_delete(&comments, id, owner);
    assert_eq!(stmt.sql, "DELETE FROM comments WHERE id = $1 AND owner_id = $2");
}

#[test]
fn test_update_set_validation() {
    let comments = Collection::new("comments").unwrap().with_attributes(["text", "score"]);

    let cases = [
        UpdateSet::new(),
        UpdateSet::new().set("owner", "someone"),
        UpdateSet::new().set("score", 1).increment("score", 1),
        UpdateSet::new().increment("score", "lots"),
        UpdateSet::new().set("text'; --", "x"),
    ];
    for updates in cases {
        let err = updates.validate(&comments).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation, "{:?}", updates);
    }

    assert!(UpdateSet::new().set("text", "hi").validate(&comments).is_ok());
}

#[test]
fn test_nested_update_builds_missing_parents() {
    let (id, owner) = (Uuid::new_v4(), Uuid::new_v4());
    let updates = UpdateSet::new()
        .increment("stats.votes", 1)
        .set("profile.links.site", "x");
    let stmt = SqlGenerator::build_owned_update(&posts(), id, owner, &updates).unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE posts SET data = jsonb_set(jsonb_set(\
         jsonb_set(jsonb_set(jsonb_set(data, \
         '{stats}', CASE WHEN jsonb_typeof(data->'stats') = 'object' \
         THEN data->'stats' ELSE '{}'::jsonb END, true), \
         '{profile}', CASE WHEN jsonb_typeof(data->'profile') = 'object' \
         THEN data->'profile' ELSE '{}'::jsonb END, true), \
         '{profile,links}', CASE WHEN jsonb_typeof(data#>'{profile,links}') = 'object' \
         THEN data#>'{profile,links}' ELSE '{}'::jsonb END, true), \
         '{stats,votes}', to_jsonb(COALESCE((data#>>'{stats,votes}')::numeric, 0) + $1), true), \
         '{profile,links,site}', $2::jsonb, true), updated_at = $3 \
         WHERE id = $4 AND owner_id = $5 RETURNING id, owner_id, created_at, updated_at, data"
    );
}

#[test]
fn test_update_set_rejects_overlapping_paths() {
    let updates = UpdateSet::new()
        .set("stats", json!({"votes": 0}))
        .increment("stats.votes", 1);
    let err = updates.validate(&posts()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);

    assert!(
        UpdateSet::new()
            .increment("stats.votes", 1)
            .increment("stats.views", 1)
            .validate(&posts())
            .is_ok()
    );
}

#[test]
fn test_decrement_negates_delta() {
    let updates = UpdateSet::new().decrement("score", 2).decrement("ratio", 0.5);
    assert_eq!(
        updates.operations(),
        &[
            ("score".to_string(), UpdateOperation::Increment(json!(-2))),
            ("ratio".to_string(), UpdateOperation::Increment(json!(-0.5))),
        ]
    );
    assert!(updates.has_only_increments());
    assert!(!UpdateSet::new().set("a", 1).has_only_increments());
}

#[test]
fn test_insert_batches() {
    let docs = vec![
        Document::new(Uuid::new_v4(), Uuid::new_v4(), &json!({"title": "a"})).unwrap(),
        Document::new(Uuid::new_v4(), Uuid::new_v4(), &json!({"title": "b"})).unwrap(),
    ];
    let stmt = SqlGenerator::build_insert(&posts(), &docs, false).unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO posts (id, owner_id, created_at, updated_at, data) \
         VALUES ($1, $2, $3, $4, $5), ($6, $7, $8, $9, $10)"
    );
    assert_eq!(stmt.params.len(), 10);

    let stmt = SqlGenerator::build_insert(&posts(), &docs[..1], true).unwrap();
    assert!(stmt.sql.ends_with("RETURNING id, owner_id, created_at, updated_at, data"));

    assert!(SqlGenerator::build_insert(&posts(), &[], false).is_err());
}

// ========================================
// Bulk lookups and pages
// ========================================

#[test]
fn test_lookup_flags_statement() {
    let votes = Collection::new("votes").unwrap();
    let user = Uuid::new_v4();
    let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
    let stmt = SqlGenerator::build_lookup_flags(
        &votes,
        &FieldPath::attribute("comment_id"),
        &FieldPath::column("owner_id"),
        user,
        &ids,
    )
    .unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT DISTINCT (data->>'comment_id')::uuid FROM votes \
         WHERE owner_id = $1 AND (data->>'comment_id')::uuid = ANY($2)"
    );
    assert_eq!(stmt.params, vec![SqlParam::Uuid(user), SqlParam::UuidArray(ids)]);

    let err = SqlGenerator::build_lookup_flags(
        &votes,
        &FieldPath::column("created_at"),
        &FieldPath::column("owner_id"),
        user,
        &[],
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
}

#[test]
fn test_lookup_values_statement() {
    let votes = Collection::new("votes").unwrap();
    let stmt = SqlGenerator::build_lookup_values(
        &votes,
        &FieldPath::attribute("comment_id"),
        &FieldPath::column("owner_id"),
        &FieldPath::attribute("direction"),
        Uuid::new_v4(),
        &[Uuid::new_v4()],
    )
    .unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT DISTINCT ON ((data->>'comment_id')::uuid) (data->>'comment_id')::uuid, \
         data->'direction' FROM votes WHERE owner_id = $1 \
         AND (data->>'comment_id')::uuid = ANY($2) \
         ORDER BY (data->>'comment_id')::uuid, updated_at DESC"
    );
}

#[test]
fn test_page_after_cursor() {
    let id = Uuid::new_v4();
    let position = KeysetPosition {
        value: Some("1700000000000".to_string()),
        id,
    };
    let stmt = SqlGenerator::build_page(
        &posts(),
        &Query::new(),
        &SortKey::column("created_at", SortOrder::Desc),
        Some(&position),
        21,
        false,
    )
    .unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT id, owner_id, created_at, updated_at, data, (created_at)::text AS cursor_value \
         FROM posts WHERE (created_at, id) < ($1::bigint, $2) \
         ORDER BY created_at DESC, id DESC LIMIT 21"
    );
    assert_eq!(
        stmt.params,
        vec![SqlParam::Text("1700000000000".to_string()), SqlParam::Uuid(id)]
    );
}

#[test]
fn test_first_page_with_total_on_attribute() {
    let owner = Uuid::new_v4();
    let stmt = SqlGenerator::build_page(
        &posts(),
        &where_owner(owner),
        &SortKey::attribute("title", SortOrder::Asc),
        None,
        11,
        true,
    )
    .unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT id, owner_id, created_at, updated_at, data, (data->>'title')::text AS cursor_value, \
         (SELECT COUNT(*) FROM posts WHERE owner_id = $1) AS total_count \
         FROM posts WHERE owner_id = $2 \
         ORDER BY data->>'title' ASC NULLS LAST, id ASC LIMIT 11"
    );
    assert_eq!(stmt.params, vec![SqlParam::Uuid(owner), SqlParam::Uuid(owner)]);
}

#[test]
fn test_attribute_page_keeps_rows_without_value() {
    let id = Uuid::new_v4();
    let sort = SortKey::attribute("score", SortOrder::Desc).with_cast("bigint");

    let position = KeysetPosition {
        value: Some("7".to_string()),
        id,
    };
    let stmt = SqlGenerator::build_page(&posts(), &Query::new(), &sort, Some(&position), 3, false)
        .unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT id, owner_id, created_at, updated_at, data, ((data->>'score')::bigint)::text AS cursor_value \
         FROM posts WHERE (((data->>'score')::bigint, id) < ($1::bigint, $2) \
         OR (data->>'score')::bigint IS NULL) \
         ORDER BY (data->>'score')::bigint DESC NULLS LAST, id DESC LIMIT 3"
    );
    assert_eq!(stmt.params, vec![SqlParam::Text("7".to_string()), SqlParam::Uuid(id)]);

    let tail = KeysetPosition { value: None, id };
    let stmt =
        SqlGenerator::build_page(&posts(), &Query::new(), &sort, Some(&tail), 3, false).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT id, owner_id, created_at, updated_at, data, ((data->>'score')::bigint)::text AS cursor_value \
         FROM posts WHERE (data->>'score')::bigint IS NULL AND id < $1 \
         ORDER BY (data->>'score')::bigint DESC NULLS LAST, id DESC LIMIT 3"
    );
    assert_eq!(stmt.params, vec![SqlParam::Uuid(id)]);

    // columns are never null, so their cursors always carry a value
    let err = SqlGenerator::build_page(
        &posts(),
        &Query::new(),
        &SortKey::column("created_at", SortOrder::Asc),
        Some(&tail),
        3,
        false,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);
}
