mod common;

use common::{record, service};
use demeter::service::MAX_SKIP;
use demeter::{AppError, CrudService, ListParams, RecordKey};
use serde_json::{json, Value};

fn key(svc: &CrudService, path: &str, segments: &[&str]) -> RecordKey {
    RecordKey::parse(svc.entity(path).unwrap(), segments).unwrap()
}

async fn seed_unit(svc: &CrudService, unit: &str) {
    let units = svc.entity("units").unwrap();
    svc.create(units, &record(json!({ "unit": unit }))).await.unwrap();
}

async fn seed_fertilizer(svc: &CrudService, name: &str) -> String {
    let fertilizers = svc.entity("fertilizers").unwrap();
    let created = svc
        .create(fertilizers, &record(json!({ "unit": "KG", "name": name })))
        .await
        .unwrap();
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn unit_lifecycle() {
    let svc = service();
    let units = svc.entity("units").unwrap();

    let created = svc.create(units, &record(json!({"unit": "L"}))).await.unwrap();
    assert_eq!(created, record(json!({"unit": "L"})));

    let err = svc.create(units, &record(json!({"unit": "L"}))).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let l = key(&svc, "units", &["L"]);
    assert_eq!(svc.get(units, &l).await.unwrap(), record(json!({"unit": "L"})));

    svc.delete(units, &l).await.unwrap();
    assert!(matches!(svc.get(units, &l).await.unwrap_err(), AppError::NotFound(_)));
    assert!(matches!(svc.delete(units, &l).await.unwrap_err(), AppError::NotFound(_)));
}

#[tokio::test]
async fn read_after_write_returns_the_input_fields() {
    let svc = service();
    let plots = svc.entity("plots").unwrap();
    let input = record(json!({
        "number": 7,
        "surface": 120,
        "name": "North field",
        "location": "Hill"
    }));
    svc.create(plots, &input).await.unwrap();
    assert_eq!(svc.get(plots, &key(&svc, "plots", &["7"])).await.unwrap(), input);
}

#[tokio::test]
async fn patch_changes_only_the_supplied_field() {
    let svc = service();
    seed_unit(&svc, "KG").await;
    let productions = svc.entity("productions").unwrap();
    svc.create(productions, &record(json!({"code": 500, "unit": "KG", "name": "E 500KG"})))
        .await
        .unwrap();

    let code = key(&svc, "productions", &["500"]);
    svc.partial_update(productions, &code, &record(json!({"name": "EC 200L"})))
        .await
        .unwrap();
    assert_eq!(
        svc.get(productions, &code).await.unwrap(),
        record(json!({"code": 500, "unit": "KG", "name": "EC 200L"}))
    );
}

#[tokio::test]
async fn patch_with_absent_or_null_fields_keeps_stored_values() {
    let svc = service();
    let plots = svc.entity("plots").unwrap();
    let before = record(json!({
        "number": 3,
        "surface": 40,
        "name": "Orchard",
        "location": "South"
    }));
    svc.create(plots, &before).await.unwrap();
    let k = key(&svc, "plots", &["3"]);

    svc.partial_update(plots, &k, &record(json!({"name": null, "surface": 45})))
        .await
        .unwrap();
    let after = svc.get(plots, &k).await.unwrap();
    assert_eq!(after["surface"], json!(45));
    assert_eq!(after["name"], json!("Orchard"));
    assert_eq!(after["location"], json!("South"));
}

#[tokio::test]
async fn empty_patch_is_a_successful_no_op() {
    let svc = service();
    let plots = svc.entity("plots").unwrap();
    let before = record(json!({"number": 4, "surface": 12, "name": "Meadow", "location": null}));
    svc.create(plots, &before).await.unwrap();
    let k = key(&svc, "plots", &["4"]);

    let returned = svc.partial_update(plots, &k, &record(json!({}))).await.unwrap();
    assert_eq!(returned, before);
    assert_eq!(svc.get(plots, &k).await.unwrap(), before);
}

#[tokio::test]
async fn replace_overwrites_every_non_key_field() {
    let svc = service();
    let plots = svc.entity("plots").unwrap();
    let old = record(json!({"number": 5, "surface": 10, "name": "Old", "location": "East"}));
    svc.create(plots, &old).await.unwrap();
    let k = key(&svc, "plots", &["5"]);

    svc.replace(plots, &k, &record(json!({"surface": 20, "name": null}))).await.unwrap();
    assert_eq!(
        svc.get(plots, &k).await.unwrap(),
        record(json!({"number": 5, "surface": 20, "name": null, "location": null}))
    );
}

#[tokio::test]
async fn mutations_on_missing_records_are_not_found() {
    let svc = service();
    let plots = svc.entity("plots").unwrap();
    let k = key(&svc, "plots", &["99"]);
    let body = record(json!({"surface": 1}));
    let err = svc.replace(plots, &k, &body).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = svc.partial_update(plots, &k, &body).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = svc.delete(plots, &k).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn replace_can_rename_a_unit_key() {
    let svc = service();
    seed_unit(&svc, "foo").await;
    seed_unit(&svc, "bar").await;
    let units = svc.entity("units").unwrap();
    let foo = key(&svc, "units", &["foo"]);

    let err = svc.replace(units, &foo, &record(json!({"unit": "bar"}))).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    svc.replace(units, &foo, &record(json!({"unit": "foobar"}))).await.unwrap();
    assert!(matches!(svc.get(units, &foo).await.unwrap_err(), AppError::NotFound(_)));
    assert_eq!(
        svc.get(units, &key(&svc, "units", &["foobar"])).await.unwrap(),
        record(json!({"unit": "foobar"}))
    );
}

#[tokio::test]
async fn list_window_past_the_end_is_empty() {
    let svc = service();
    for u in ["G", "KG", "L"] {
        seed_unit(&svc, u).await;
    }
    let units = svc.entity("units").unwrap();

    let page = svc
        .list(units, &ListParams { skip: Some(3), ..Default::default() })
        .await
        .unwrap();
    assert!(page.rows.is_empty());

    let page = svc
        .list(units, &ListParams { skip: Some(1), limit: Some(1), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(page.rows, vec![record(json!({"unit": "KG"}))]);
    assert_eq!((page.skip, page.limit), (1, 1));
}

#[tokio::test]
async fn list_defaults_and_caps_the_limit() {
    let svc = service();
    let units = svc.entity("units").unwrap();
    let page = svc.list(units, &ListParams::default()).await.unwrap();
    assert_eq!((page.skip, page.limit), (0, 10));
    let page = svc
        .list(units, &ListParams { limit: Some(5000), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(page.limit, 1000);
}

#[tokio::test]
async fn largest_skip_is_clamped_and_still_empty() {
    let svc = service();
    seed_unit(&svc, "KG").await;
    let units = svc.entity("units").unwrap();
    let page = svc
        .list(units, &ListParams { skip: Some(u64::MAX), ..Default::default() })
        .await
        .unwrap();
    assert!(page.rows.is_empty());
    assert_eq!(page.skip, MAX_SKIP);
}

#[tokio::test]
async fn spreads_list_by_quantity_ascending() {
    let svc = service();
    seed_unit(&svc, "KG").await;
    let a = seed_fertilizer(&svc, "NPK").await;
    let b = seed_fertilizer(&svc, "Urea").await;
    let plots = svc.entity("plots").unwrap();
    svc.create(plots, &record(json!({"number": 1}))).await.unwrap();

    let spreads = svc.entity("spreads").unwrap();
    let first = record(json!({
        "fertilizer_id": a,
        "plot_number": 1,
        "date": "2023-04-01",
        "spread_quantity": 30
    }));
    let second = record(json!({
        "fertilizer_id": b,
        "plot_number": 1,
        "date": "2023-04-02",
        "spread_quantity": 10
    }));
    svc.create(spreads, &first).await.unwrap();
    svc.create(spreads, &second).await.unwrap();

    let quantities = |rows: &[demeter::Record]| -> Vec<Value> {
        rows.iter().map(|r| r["spread_quantity"].clone()).collect()
    };

    let page = svc.list(spreads, &ListParams::default()).await.unwrap();
    assert_eq!(quantities(&page.rows), vec![json!(10), json!(30)]);

    let params = ListParams {
        sort: Some("spread_quantity".into()),
        order: Some("desc".into()),
        ..Default::default()
    };
    let page = svc.list(spreads, &params).await.unwrap();
    assert_eq!(quantities(&page.rows), vec![json!(30), json!(10)]);

    let one = svc.get(spreads, &key(&svc, "spreads", &[b.as_str(), "1"])).await.unwrap();
    assert_eq!(one["spread_quantity"], json!(10));
}

#[tokio::test]
async fn list_rejects_unknown_sort_and_order_without_sort() {
    let svc = service();
    let units = svc.entity("units").unwrap();
    let unknown = ListParams { sort: Some("colour".into()), ..Default::default() };
    let bare_order = ListParams { order: Some("desc".into()), ..Default::default() };
    let bad_order = ListParams {
        sort: Some("unit".into()),
        order: Some("up".into()),
        ..Default::default()
    };
    for params in [unknown, bare_order, bad_order] {
        let err = svc.list(units, &params).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}

#[tokio::test]
async fn fertilizer_names_are_unique_and_ids_generated() {
    let svc = service();
    seed_unit(&svc, "KG").await;
    let fertilizers = svc.entity("fertilizers").unwrap();

    let client_id = "c3244185-8318-41a7-9e10-84eaa772ab4b";
    let created = svc
        .create(fertilizers, &record(json!({"id": client_id, "unit": "KG", "name": "NPK"})))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();
    assert_ne!(id, client_id);
    assert!(uuid::Uuid::parse_str(id).is_ok());

    let err = svc
        .create(fertilizers, &record(json!({"unit": "KG", "name": "NPK"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let other = seed_fertilizer(&svc, "Urea").await;
    let other = key(&svc, "fertilizers", &[other.as_str()]);
    let err = svc
        .partial_update(fertilizers, &other, &record(json!({"name": "NPK"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn create_requires_non_empty_fields() {
    let svc = service();
    let productions = svc.entity("productions").unwrap();
    let err = svc
        .create(productions, &record(json!({"code": 1, "unit": "KG"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    let units = svc.entity("units").unwrap();
    let err = svc.create(units, &record(json!({"unit": ""}))).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn references_must_exist_when_checks_are_on() {
    let svc = service();
    let productions = svc.entity("productions").unwrap();
    let body = record(json!({"code": 1, "unit": "KG", "name": "Wheat"}));
    let err = svc.create(productions, &body).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(m) if m.contains("unit")));

    seed_unit(&svc, "KG").await;
    svc.create(productions, &body).await.unwrap();

    let cultures = svc.entity("cultures").unwrap();
    let culture = record(json!({
        "plot_number": 9,
        "production_code": 1,
        "start_date": "2024-03-01"
    }));
    assert!(matches!(
        svc.create(cultures, &culture).await.unwrap_err(),
        AppError::InvalidInput(_)
    ));

    let relaxed = service().with_reference_checks(false);
    let cultures = relaxed.entity("cultures").unwrap();
    let created = relaxed.create(cultures, &culture).await.unwrap();
    assert_eq!(created["start_date"], json!("2024-03-01"));
    assert_eq!(created["end_date"], Value::Null);
}
