use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Extension, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use shift_portal::{
    api,
    domain::{
        filters::FilterSet,
        models::{AllowanceRow, Period, RateEntry, RateTable},
    },
    infrastructure::{
        cache::NoopCache,
        config::Config,
        source::{MemorySource, RateSource, RowSource, SourceError},
        state::AppState,
    },
};
use tower::ServiceExt;

fn current_period() -> Period {
    Period::from_date(Utc::now().date_naive())
}

fn row(
    id: &str,
    name: &str,
    client: &str,
    dept: &str,
    partner: &str,
    shift: &str,
    days: f64,
    rate: f64,
) -> AllowanceRow {
    AllowanceRow {
        employee_id: Some(id.to_string()),
        employee_name: name.to_string(),
        client: client.to_string(),
        department: dept.to_string(),
        client_partner: partner.to_string(),
        period: current_period(),
        shift_type: shift.to_string(),
        days,
        rate,
    }
}

fn sample_rows() -> Vec<AllowanceRow> {
    vec![
        row("E1", "Asha", "Acme", "Data", "North", "A", 4.0, 100.0),
        row("E1", "Asha", "Acme", "Data", "North", "B", 2.0, 150.0),
        row("E2", "Ben", "Acme", "Data", "North", "A", 3.0, 100.0),
        row("E3", "Cleo", "Acme", "Ops", "North", "PRIME", 5.0, 200.0),
        row("E4", "Dev", "Globex", "Data", "South", "A", 1.0, 100.0),
    ]
}

fn build_app(rows: Vec<AllowanceRow>, rates: Vec<RateEntry>) -> Router {
    let config = Arc::new(Config::for_tests());
    let source = Arc::new(MemorySource::new(rows, rates));
    let state = Arc::new(AppState::new(
        config,
        source.clone(),
        source,
        Arc::new(NoopCache),
    ));
    api::build_router().layer(Extension(state))
}

async fn post_json(app: Router, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
        )
        .await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn default_request_aggregates_latest_month() -> Result<()> {
    let app = build_app(sample_rows(), Vec::new());
    let (status, body) = post_json(app, "/api/dashboard", json!({})).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total_clients"], 2);
    assert_eq!(body["summary"]["total_headcount"], 4);

    let clients = body["clients"].as_array().unwrap();
    // First-seen order from the source, not alphabetical.
    assert_eq!(clients[0]["client"], "Acme");
    assert_eq!(clients[0]["client_partner"], "North");
    assert_eq!(clients[1]["client"], "Globex");

    // E1 appears on two rows but counts once.
    assert_eq!(clients[0]["headcount"], 3);
    assert_eq!(clients[0]["departments"], 2);
    assert_eq!(
        clients[0]["total_allowance"],
        json!(4.0 * 100.0 + 2.0 * 150.0 + 3.0 * 100.0 + 5.0 * 200.0)
    );

    let partners = body["partners"].as_array().unwrap();
    assert_eq!(partners.len(), 2);
    assert_eq!(partners[0]["client_partner"], "North");
    assert_eq!(partners[0]["headcount"], 3);
    Ok(())
}

#[tokio::test]
async fn headcount_ranges_filter_clients_after_aggregation() -> Result<()> {
    let app = build_app(sample_rows(), Vec::new());
    let (status, body) = post_json(app, "/api/dashboard", json!({"headcounts": "2-5"})).await?;

    assert_eq!(status, StatusCode::OK);
    let clients = body["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["client"], "Acme");
    assert_eq!(body["summary"]["total_clients"], 1);
    Ok(())
}

#[tokio::test]
async fn department_selection_switches_headcount_scope() -> Result<()> {
    let app = build_app(sample_rows(), Vec::new());
    let (status, body) = post_json(
        app,
        "/api/dashboard",
        json!({"departments": "Data,Ops", "headcounts": "2-5"}),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    // Only Acme/Data has 2+ people; Acme/Ops and Globex/Data drop out and
    // Acme's roll-up shrinks to the surviving department.
    let clients = body["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["client"], "Acme");
    assert_eq!(clients[0]["departments"], 1);
    assert_eq!(clients[0]["headcount"], 2);
    Ok(())
}

#[tokio::test]
async fn sort_and_top_apply_after_filtering() -> Result<()> {
    let app = build_app(sample_rows(), Vec::new());
    let (status, body) = post_json(
        app,
        "/api/dashboard",
        json!({"sort_by": "total_allowance", "sort_order": "desc", "top": 1}),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    let clients = body["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["client"], "Acme");
    // Summary still covers both clients; top only trims the listing.
    assert_eq!(body["summary"]["total_clients"], 2);
    Ok(())
}

#[tokio::test]
async fn unknown_sort_key_is_rejected() -> Result<()> {
    let app = build_app(sample_rows(), Vec::new());
    let (status, body) =
        post_json(app, "/api/dashboard", json!({"sort_by": "alphabetical"})).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("sort_by"));
    Ok(())
}

#[tokio::test]
async fn invalid_shift_key_is_rejected_naming_offender() -> Result<()> {
    let app = build_app(sample_rows(), Vec::new());
    let (status, body) = post_json(app, "/api/dashboard", json!({"shifts": "NIGHT"})).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("NIGHT"));
    Ok(())
}

#[tokio::test]
async fn empty_source_returns_no_data_message() -> Result<()> {
    let app = build_app(Vec::new(), Vec::new());
    let (status, body) = post_json(app, "/api/dashboard", json!({})).await?;

    assert_eq!(status, StatusCode::OK);
    assert!(body["clients"].as_array().unwrap().is_empty());
    let messages = body["messages"].as_array().unwrap();
    assert!(messages
        .iter()
        .any(|m| m == "No data found for selected filters."));
    Ok(())
}

#[tokio::test]
async fn shift_filter_participates_in_period_fallback() -> Result<()> {
    // PRIME data only exists in an older month; the current month holds
    // nothing that survives the shift filter, so the resolver must keep
    // falling back instead of settling on the current month.
    let current = current_period();
    let mut old = row("E5", "Mira", "Initech", "Ops", "South", "PRIME", 3.0, 200.0);
    old.period = Period::new(current.year - 1, 3);
    let rows = vec![
        row("E1", "Asha", "Acme", "Data", "North", "A", 4.0, 100.0),
        old,
    ];

    let app = build_app(rows, Vec::new());
    let (status, body) = post_json(app, "/api/dashboard", json!({"shifts": "PRIME"})).await?;

    assert_eq!(status, StatusCode::OK);
    let clients = body["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["client"], "Initech");
    assert!(!body["messages"].as_array().unwrap().is_empty());
    Ok(())
}

struct FailingSource;

#[async_trait::async_trait]
impl RowSource for FailingSource {
    async fn fetch_rows(
        &self,
        _periods: &[Period],
        _filters: &FilterSet,
    ) -> Result<Vec<AllowanceRow>, SourceError> {
        Err(SourceError::Query("connection reset".into()))
    }

    async fn period_has_data(
        &self,
        _period: Period,
        _filters: &FilterSet,
    ) -> Result<bool, SourceError> {
        Err(SourceError::Query("connection reset".into()))
    }

    async fn latest_period(&self, _filters: &FilterSet) -> Result<Option<Period>, SourceError> {
        Err(SourceError::Query("connection reset".into()))
    }

    async fn distinct_clients(&self) -> Result<Vec<String>, SourceError> {
        Err(SourceError::Query("connection reset".into()))
    }
}

#[async_trait::async_trait]
impl RateSource for FailingSource {
    async fn rate_table(&self) -> Result<RateTable, SourceError> {
        Err(SourceError::Query("connection reset".into()))
    }
}

#[tokio::test]
async fn source_failure_surfaces_as_bad_gateway() -> Result<()> {
    let config = Arc::new(Config::for_tests());
    let source = Arc::new(FailingSource);
    let state = Arc::new(AppState::new(
        config,
        source.clone(),
        source,
        Arc::new(NoopCache),
    ));
    let app = api::build_router().layer(Extension(state));

    let (status, body) = post_json(app, "/api/dashboard", json!({})).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("row source failure"));
    Ok(())
}

#[tokio::test]
async fn search_paginates_and_recomputes_from_rate_table() -> Result<()> {
    let year = current_period().year;
    let rates = vec![
        RateEntry {
            shift_type: "A".into(),
            payroll_year: year,
            amount: 110.0,
        },
        RateEntry {
            shift_type: "B".into(),
            payroll_year: year,
            amount: 150.0,
        },
        RateEntry {
            shift_type: "PRIME".into(),
            payroll_year: year,
            amount: 200.0,
        },
    ];
    let app = build_app(sample_rows(), rates);
    let (status, body) = post_json(
        app,
        "/api/search",
        json!({"sort_by": "total_allowance", "start": 0, "limit": 2}),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 4);
    let employees = body["employees"].as_array().unwrap();
    assert_eq!(employees.len(), 2);
    // Numeric sort key with no explicit order defaults to descending.
    assert_eq!(employees[0]["employee_id"], "E3");
    // Allowance comes from the rate table, not the stored row rate.
    assert_eq!(employees[1]["total_allowance"], json!(4.0 * 110.0 + 2.0 * 150.0));
    Ok(())
}

#[tokio::test]
async fn search_with_no_matches_is_not_found() -> Result<()> {
    let app = build_app(sample_rows(), Vec::new());
    let (status, body) = post_json(app, "/api/search", json!({"clients": "Initech"})).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("No records"));
    Ok(())
}

#[tokio::test]
async fn clients_endpoint_lists_distinct_names() -> Result<()> {
    let app = build_app(sample_rows(), Vec::new());
    let response = app
        .oneshot(Request::builder().uri("/api/clients").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["clients"], json!(["Acme", "Globex"]));
    Ok(())
}
