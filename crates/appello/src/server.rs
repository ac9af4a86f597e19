use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dates::{self, DateRange, ReportMode};
use crate::error::StoreError;
use crate::html::{self, ClassSummary, ReportBody, ReportView, SetupView, SheetView};
use crate::report::{self, SortDirection, SortField, StudentQuery};
use crate::setup::Setup;
use crate::sheet::{AttendanceSheet, RollLookup, SheetRow, SheetState};
use crate::store::SharedStore;
use crate::types::{
    AttendanceRecord, AttendanceStats, AttendanceStatus, Class, ExportFilter, NewStudent, Student,
};

/// Application state shared across requests
pub struct AppState {
    pub store: SharedStore,
    pub config: Config,
}

type AppStateRef = State<Arc<AppState>>;

/// Store errors as HTTP responses with a `{"error": ...}` body
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::Duplicate(_) => StatusCode::CONFLICT,
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if self.0.is_user_error() {
            warn!(error = %self.0, "Request rejected");
        } else {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Reads never fail the request: a backend error is logged and an empty
/// value is returned instead
fn or_empty<T: Default>(result: Result<T, StoreError>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        error!(error = %e, what = what, "Read failed");
        T::default()
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/setup", get(setup_page))
        .route("/attendance", get(attendance_page))
        .route("/report", get(report_page))
        .route("/api/classes", get(list_classes).post(create_class))
        .route("/api/classes/{id}", put(rename_class).delete(remove_class))
        .route("/api/classes/{id}/divisions", get(list_divisions))
        .route("/api/students", get(list_students).post(create_student))
        .route("/api/students/{id}", put(edit_student).delete(remove_student))
        .route("/api/attendance", get(list_attendance).post(mark_attendance))
        .route("/api/attendance/{date}", delete(remove_attendance_for_date))
        .route("/api/stats", get(attendance_stats))
        .route("/api/dates", get(attendance_dates))
        .route("/api/export", get(export_csv))
        .route(
            "/api/sheet/{class}/{date}",
            get(sheet_rows).delete(sheet_delete_all),
        )
        .route("/api/sheet/{class}/{date}/refresh", post(sheet_refresh))
        .route("/api/sheet/{class}/{date}/roll", post(sheet_roll))
        .route("/api/sheet/{class}/{date}/toggle", post(sheet_toggle))
        .route("/api/sheet/{class}/{date}/all-present", post(sheet_all_present))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(
        addr = %addr,
        backend = state.store.backend_name(),
        dir = %state.config.data_dir.display(),
        "Server running"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- classes ---

#[derive(Debug, Deserialize)]
struct ClassBody {
    name: String,
}

async fn list_classes(State(state): AppStateRef) -> Json<Vec<Class>> {
    Json(or_empty(state.store.get_classes(), "classes"))
}

async fn create_class(
    State(state): AppStateRef,
    Json(body): Json<ClassBody>,
) -> ApiResult<(StatusCode, Json<Class>)> {
    let setup = Setup::new(state.store.as_ref(), state.config.max_classes);
    let class = setup.add_class(&body.name)?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn rename_class(
    State(state): AppStateRef,
    Path(id): Path<String>,
    Json(body): Json<ClassBody>,
) -> ApiResult<Json<Class>> {
    let class = Class { id, name: body.name };
    if !state.store.update_class(&class)? {
        return Err(StoreError::not_found("class", class.id).into());
    }
    let class = state
        .store
        .get_class(&class.id)?
        .ok_or_else(|| StoreError::not_found("class", class.id.clone()))?;
    Ok(Json(class))
}

async fn remove_class(State(state): AppStateRef, Path(id): Path<String>) -> ApiResult<StatusCode> {
    if state.store.delete_class(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::not_found("class", id).into())
    }
}

async fn list_divisions(State(state): AppStateRef, Path(id): Path<String>) -> Json<Vec<String>> {
    Json(or_empty(state.store.get_divisions_by_class(&id), "divisions"))
}

// --- students ---

#[derive(Debug, Default, Deserialize)]
struct StudentFilter {
    class: Option<String>,
    division: Option<String>,
    search: Option<String>,
    sort: Option<SortField>,
    direction: Option<SortDirection>,
}

impl StudentFilter {
    fn query(&self) -> StudentQuery {
        StudentQuery {
            search: self.search.clone(),
            sort: self.sort.unwrap_or_default(),
            direction: self.direction.unwrap_or_default(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

async fn list_students(
    State(state): AppStateRef,
    Query(filter): Query<StudentFilter>,
) -> Json<Vec<Student>> {
    let students = match non_empty(&filter.class) {
        Some(class_id) => state
            .store
            .get_students_by_class_and_division(class_id, non_empty(&filter.division)),
        None => state.store.get_students(),
    };
    Json(filter.query().apply(or_empty(students, "students")))
}

async fn create_student(
    State(state): AppStateRef,
    Json(body): Json<NewStudent>,
) -> ApiResult<(StatusCode, Json<Student>)> {
    let setup = Setup::new(state.store.as_ref(), state.config.max_classes);
    let student = setup.add_student(body)?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn edit_student(
    State(state): AppStateRef,
    Path(id): Path<String>,
    Json(body): Json<NewStudent>,
) -> ApiResult<Json<Student>> {
    let setup = Setup::new(state.store.as_ref(), state.config.max_classes);
    match setup.update_student(&id, body)? {
        Some(student) => Ok(Json(student)),
        None => Err(StoreError::not_found("student", id).into()),
    }
}

async fn remove_student(
    State(state): AppStateRef,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.store.delete_student(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::not_found("student", id).into())
    }
}

// --- attendance ---

#[derive(Debug, Deserialize)]
struct AttendanceFilter {
    date: Option<String>,
    class: Option<String>,
    division: Option<String>,
}

async fn list_attendance(
    State(state): AppStateRef,
    Query(filter): Query<AttendanceFilter>,
) -> Json<Vec<AttendanceRecord>> {
    let store = &state.store;
    let records = match (non_empty(&filter.date), non_empty(&filter.class)) {
        (Some(date), Some(class_id)) => match non_empty(&filter.division) {
            Some(division) => {
                store.get_attendance_by_date_class_and_division(date, class_id, division)
            }
            None => store.get_attendance_by_date_and_class(date, class_id),
        },
        (Some(date), None) => store.get_attendance_by_date(date),
        (None, _) => store.get_attendance_records(),
    };
    Json(or_empty(records, "attendance"))
}

async fn mark_attendance(
    State(state): AppStateRef,
    Json(record): Json<AttendanceRecord>,
) -> ApiResult<Json<AttendanceRecord>> {
    dates::parse_date(&record.date)?;
    state.store.mark_attendance(&record)?;
    Ok(Json(record))
}

async fn remove_attendance_for_date(
    State(state): AppStateRef,
    Path(date): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    dates::parse_date(&date)?;
    let removed = state.store.delete_attendance_by_date(&date)?;
    Ok(Json(json!({ "removed": removed })))
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    class: String,
    from: String,
    to: String,
}

async fn attendance_stats(
    State(state): AppStateRef,
    Query(params): Query<RangeParams>,
) -> Json<AttendanceStats> {
    Json(or_empty(
        state
            .store
            .get_attendance_stats(&params.class, &params.from, &params.to),
        "stats",
    ))
}

#[derive(Debug, Deserialize)]
struct DatesParams {
    class: Option<String>,
}

async fn attendance_dates(
    State(state): AppStateRef,
    Query(params): Query<DatesParams>,
) -> Json<Vec<String>> {
    let dates = match non_empty(&params.class) {
        Some(class_id) => state.store.get_attendance_dates_by_class(class_id),
        None => state.store.get_all_attendance_dates(),
    };
    Json(or_empty(dates, "dates"))
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    from: Option<String>,
    to: Option<String>,
    class: Option<String>,
    division: Option<String>,
}

async fn export_csv(
    State(state): AppStateRef,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let filter = ExportFilter {
        start: params.from.unwrap_or_default(),
        end: params.to.unwrap_or_default(),
        class_id: params.class.filter(|c| !c.is_empty()),
        division: params.division.filter(|d| !d.is_empty()),
    };
    let body = state.store.export_attendance_to_csv(&filter)?;
    let filename = format!(
        "attendance_{}_{}.csv",
        if filter.start.is_empty() { "all" } else { filter.start.as_str() },
        if filter.end.is_empty() { "all" } else { filter.end.as_str() },
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

// --- attendance sheet ---

#[derive(Debug, Default, Deserialize)]
struct SheetParams {
    division: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollBody {
    tr_no: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleBody {
    student_id: String,
}

fn sheet_json(state: SheetState, rows: Vec<SheetRow>) -> Json<serde_json::Value> {
    Json(json!({ "sheet": state, "rows": rows }))
}

async fn sheet_rows(
    State(state): AppStateRef,
    Path((class_id, date)): Path<(String, String)>,
    Query(params): Query<SheetParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let sheet = AttendanceSheet::resume(
        state.store.as_ref(),
        &class_id,
        non_empty(&params.division),
        &date,
    )?;
    Ok(sheet_json(sheet.state(), sheet.rows()?))
}

async fn sheet_refresh(
    State(state): AppStateRef,
    Path((class_id, date)): Path<(String, String)>,
    Query(params): Query<SheetParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut sheet = AttendanceSheet::new(
        state.store.as_ref(),
        &class_id,
        non_empty(&params.division),
        &date,
    )?;
    sheet.refresh()?;
    Ok(sheet_json(sheet.state(), sheet.rows()?))
}

async fn sheet_roll(
    State(state): AppStateRef,
    Path((class_id, date)): Path<(String, String)>,
    Query(params): Query<SheetParams>,
    Json(body): Json<RollBody>,
) -> ApiResult<Json<RollLookup>> {
    let sheet = AttendanceSheet::resume(
        state.store.as_ref(),
        &class_id,
        non_empty(&params.division),
        &date,
    )?;
    Ok(Json(sheet.mark_present_by_roll(body.tr_no.trim())?))
}

async fn sheet_toggle(
    State(state): AppStateRef,
    Path((class_id, date)): Path<(String, String)>,
    Query(params): Query<SheetParams>,
    Json(body): Json<ToggleBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let sheet = AttendanceSheet::resume(
        state.store.as_ref(),
        &class_id,
        non_empty(&params.division),
        &date,
    )?;
    let status: AttendanceStatus = sheet.toggle(&body.student_id)?;
    Ok(Json(
        json!({ "studentId": body.student_id, "status": status }),
    ))
}

async fn sheet_all_present(
    State(state): AppStateRef,
    Path((class_id, date)): Path<(String, String)>,
    Query(params): Query<SheetParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let sheet = AttendanceSheet::resume(
        state.store.as_ref(),
        &class_id,
        non_empty(&params.division),
        &date,
    )?;
    let marked = sheet.mark_all_present()?;
    Ok(Json(json!({ "marked": marked })))
}

async fn sheet_delete_all(
    State(state): AppStateRef,
    Path((class_id, date)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut sheet = AttendanceSheet::resume(state.store.as_ref(), &class_id, None, &date)?;
    let removed = sheet.delete_all()?;
    Ok(Json(json!({ "removed": removed })))
}

// --- pages ---

async fn dashboard_page(State(state): AppStateRef) -> Html<String> {
    let store = &state.store;
    let summaries: Vec<ClassSummary> = or_empty(store.get_classes(), "classes")
        .into_iter()
        .map(|class| ClassSummary {
            student_count: or_empty(store.get_students_by_class(&class.id), "students").len(),
            recent_dates: or_empty(store.get_attendance_dates_by_class(&class.id), "dates")
                .into_iter()
                .take(5)
                .collect(),
            class,
        })
        .collect();

    let today = dates::format_date(dates::today());
    Html(html::render_dashboard(&summaries, &today).into_string())
}

async fn setup_page(
    State(state): AppStateRef,
    Query(filter): Query<StudentFilter>,
) -> Html<String> {
    let classes = or_empty(state.store.get_classes(), "classes");
    let selected = non_empty(&filter.class)
        .map(str::to_string)
        .or_else(|| classes.first().map(|c| c.id.clone()));

    let query = filter.query();
    let students = match &selected {
        Some(class_id) => {
            let setup = Setup::new(state.store.as_ref(), state.config.max_classes);
            or_empty(setup.list_students(Some(class_id), &query), "students")
        }
        None => Vec::new(),
    };

    let view = SetupView {
        classes: &classes,
        selected_class: selected.as_deref(),
        students: &students,
        query: &query,
        max_classes: state.config.max_classes,
    };
    Html(html::render_setup(&view).into_string())
}

#[derive(Debug, Default, Deserialize)]
struct PageParams {
    class: Option<String>,
    date: Option<String>,
    division: Option<String>,
    mode: Option<String>,
}

impl PageParams {
    /// The requested date, or today when missing or malformed
    fn date_or_today(&self) -> String {
        non_empty(&self.date)
            .and_then(|d| dates::parse_date(d).ok())
            .map(dates::format_date)
            .unwrap_or_else(|| dates::format_date(dates::today()))
    }
}

async fn attendance_page(
    State(state): AppStateRef,
    Query(params): Query<PageParams>,
) -> Html<String> {
    let store = state.store.as_ref();
    let date = params.date_or_today();

    let class = non_empty(&params.class).and_then(|id| or_empty(store.get_class(id), "class"));
    let Some(class) = class else {
        let classes = or_empty(store.get_classes(), "classes");
        return Html(html::render_class_picker(&classes, "/attendance", &date).into_string());
    };

    let division = non_empty(&params.division);
    let divisions = or_empty(store.get_divisions_by_class(&class.id), "divisions");

    let (sheet_state, rows) = match AttendanceSheet::resume(store, &class.id, division, &date) {
        Ok(sheet) => (sheet.state(), or_empty(sheet.rows(), "sheet rows")),
        Err(e) => {
            error!(error = %e, "Failed to open attendance sheet");
            (SheetState::Unset, Vec::new())
        }
    };

    let view = SheetView {
        class: &class,
        date: &date,
        division,
        divisions: &divisions,
        state: sheet_state,
        rows: &rows,
    };
    Html(html::render_sheet(&view).into_string())
}

async fn report_page(
    State(state): AppStateRef,
    Query(params): Query<PageParams>,
) -> Html<String> {
    let store = state.store.as_ref();
    let classes = or_empty(store.get_classes(), "classes");
    let anchor = params.date_or_today();
    let mode: ReportMode = params
        .mode
        .as_deref()
        .and_then(|m| m.parse().ok())
        .unwrap_or_default();

    let class = match non_empty(&params.class) {
        Some(id) => classes.iter().find(|c| c.id == id),
        None => classes.first(),
    };

    let division = non_empty(&params.division);
    let divisions = match class {
        Some(class) => or_empty(store.get_divisions_by_class(&class.id), "divisions"),
        None => Vec::new(),
    };

    let body = class.map(|class| {
        let students = or_empty(
            store.get_students_by_class_and_division(&class.id, division),
            "students",
        );
        match mode {
            ReportMode::Daily => {
                let records = or_empty(
                    store.get_attendance_by_date_and_class(&anchor, &class.id),
                    "attendance",
                );
                ReportBody::Daily(report::daily_report(&anchor, &students, &records))
            }
            ReportMode::Weekly | ReportMode::Monthly => {
                let range = match dates::parse_date(&anchor) {
                    Ok(day) => DateRange::for_mode(mode, day),
                    Err(_) => DateRange::for_mode(mode, dates::today()),
                };
                let (start, end) = (range.start_str(), range.end_str());
                let stats = or_empty(store.get_attendance_stats(&class.id, &start, &end), "stats");
                ReportBody::Range(report::range_summary(
                    &start,
                    &end,
                    &students,
                    &stats,
                    stats.total_days,
                ))
            }
        }
    });

    let view = ReportView {
        classes: &classes,
        class,
        division,
        divisions: &divisions,
        mode,
        anchor: &anchor,
        body,
    };
    Html(html::render_report(&view).into_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, SqliteStore};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app_state(store: SharedStore) -> Arc<AppState> {
        Arc::new(AppState {
            store,
            config: Config::default(),
        })
    }

    fn sqlite_app() -> Router {
        router(app_state(Arc::new(SqliteStore::open_in_memory().unwrap())))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn post_class(app: &Router, name: &str) -> String {
        let response = send(app, "POST", "/api/classes", Some(json!({ "name": name }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    async fn post_student(app: &Router, class_id: &str, tr_no: &str, name: &str) -> Response {
        send(
            app,
            "POST",
            "/api/students",
            Some(json!({
                "trNo": tr_no,
                "name": name,
                "itsNo": format!("ITS{tr_no}"),
                "classId": class_id,
                "division": "",
            })),
        )
        .await
    }

    #[tokio::test]
    async fn test_class_crud_and_cap() {
        let app = sqlite_app();
        let id = post_class(&app, "Grade 5").await;
        post_class(&app, "Grade 6").await;

        let response = send(&app, "POST", "/api/classes", Some(json!({ "name": "Grade 7" }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Maximum of 2 classes allowed");

        let response = send(
            &app,
            "PUT",
            &format!("/api/classes/{id}"),
            Some(json!({ "name": "Grade 5B" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "Grade 5B");

        let response = send(&app, "DELETE", &format!("/api/classes/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, "DELETE", &format!("/api/classes/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let classes = body_json(send(&app, "GET", "/api/classes", None).await).await;
        assert_eq!(classes.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_student_is_conflict() {
        let app = sqlite_app();
        let class_id = post_class(&app, "Grade 5").await;

        let response = post_student(&app, &class_id, "1", "Amina").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let student = body_json(response).await;
        assert!(student.get("division").is_none());

        let response = post_student(&app, &class_id, "1", "Bilal").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"], "Tr. No. already exists");
    }

    #[tokio::test]
    async fn test_student_unknown_class_is_not_found() {
        let app = sqlite_app();
        let response = post_student(&app, "missing", "1", "Amina").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sheet_flow_over_http() {
        let app = sqlite_app();
        let class_id = post_class(&app, "Grade 5").await;
        post_student(&app, &class_id, "1", "Amina").await;
        post_student(&app, &class_id, "2", "Bilal").await;
        let base = format!("/api/sheet/{class_id}/2024-01-08");

        // Marking before the sheet exists is rejected
        let response = send(&app, "POST", &format!("{base}/roll"), Some(json!({ "trNo": "1" }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, "POST", &format!("{base}/refresh"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let sheet = body_json(response).await;
        assert_eq!(sheet["sheet"]["state"], "ready");
        assert_eq!(sheet["sheet"]["mode"], "newSheet");
        assert_eq!(sheet["rows"].as_array().unwrap().len(), 2);

        let response = send(&app, "POST", &format!("{base}/roll"), Some(json!({ "trNo": "1" }))).await;
        assert_eq!(body_json(response).await["outcome"], "marked");

        let response = send(&app, "POST", &format!("{base}/roll"), Some(json!({ "trNo": "99" }))).await;
        let lookup = body_json(response).await;
        assert_eq!(lookup["outcome"], "notFound");
        assert_eq!(lookup["trNo"], "99");

        let response = send(&app, "POST", &format!("{base}/all-present"), None).await;
        assert_eq!(body_json(response).await["marked"], 1);

        let response = send(&app, "POST", &format!("{base}/refresh"), None).await;
        assert_eq!(body_json(response).await["sheet"]["mode"], "edit");

        let stats = body_json(
            send(
                &app,
                "GET",
                &format!("/api/stats?class={class_id}&from=2024-01-01&to=2024-01-31"),
                None,
            )
            .await,
        )
        .await;
        assert_eq!(stats["totalDays"], 1);

        let response = send(&app, "DELETE", &base, None).await;
        assert_eq!(body_json(response).await["removed"], 2);

        let dates = body_json(send(&app, "GET", "/api/dates", None).await).await;
        assert!(dates.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_is_csv_attachment() {
        let dir = TempDir::new().unwrap();
        let app = router(app_state(Arc::new(JsonFileStore::open(dir.path()).unwrap())));
        let class_id = post_class(&app, "Grade 5").await;
        let student = body_json(post_student(&app, &class_id, "1", "Amina, Jr.").await).await;

        let response = send(
            &app,
            "POST",
            "/api/attendance",
            Some(json!({
                "date": "2024-01-08",
                "classId": class_id,
                "studentId": student["id"],
                "status": "present",
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "GET", "/api/export?from=2024-01-01&to=2024-01-31", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("attendance_2024-01-01_2024-01-31.csv"));

        let csv = body_text(response).await;
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Date,Class,Division,Subject,Student Name,Tr. No.,ITS No.,Status"
        );
        assert_eq!(lines[1], "2024-01-08,Grade 5,,,\"Amina, Jr.\",1,ITS1,present");
    }

    #[tokio::test]
    async fn test_mark_attendance_rejects_bad_date() {
        let app = sqlite_app();
        let response = send(
            &app,
            "POST",
            "/api/attendance",
            Some(json!({
                "date": "08/01/2024",
                "classId": "c",
                "studentId": "s",
                "status": "present",
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_read_failure_returns_empty_list() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("appello_classes.json"), "not json").unwrap();
        let app = router(app_state(Arc::new(store)));

        let response = send(&app, "GET", "/api/classes", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_pages_render() {
        let app = sqlite_app();
        let class_id = post_class(&app, "Grade 5").await;
        post_student(&app, &class_id, "1", "Amina").await;

        let html = body_text(send(&app, "GET", "/", None).await).await;
        assert!(html.contains("Grade 5"));
        assert!(html.contains("1 students"));

        let html = body_text(send(&app, "GET", "/setup", None).await).await;
        assert!(html.contains("Amina"));

        let uri = format!("/attendance?class={class_id}&date=2024-01-08");
        let html = body_text(send(&app, "GET", &uri, None).await).await;
        assert!(html.contains("Start attendance"));

        let uri = format!("/report?class={class_id}&mode=weekly&date=2024-01-10");
        let html = body_text(send(&app, "GET", &uri, None).await).await;
        assert!(html.contains("Monday, January 8, 2024"));
        assert!(html.contains("Amina"));
    }

    #[tokio::test]
    async fn test_edit_student_trims_identifiers() {
        let app = sqlite_app();
        let class_id = post_class(&app, "Grade 5").await;
        let student = body_json(post_student(&app, &class_id, "1", "Amina").await).await;
        let uri = format!("/api/students/{}", student["id"].as_str().unwrap());

        let response = send(
            &app,
            "PUT",
            &uri,
            Some(json!({
                "trNo": " 7 ",
                "name": "Amina",
                "itsNo": "ITS7 ",
                "classId": class_id,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["trNo"], "7");
        assert_eq!(updated["itsNo"], "ITS7");

        let response = send(&app, "PUT", "/api/students/missing", Some(updated)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_report_page_filters_by_division() {
        let app = sqlite_app();
        let class_id = post_class(&app, "Grade 5").await;
        for (tr_no, name, division) in [("1", "Amina", "A B"), ("2", "Bilal", "C")] {
            let response = send(
                &app,
                "POST",
                "/api/students",
                Some(json!({
                    "trNo": tr_no,
                    "name": name,
                    "itsNo": format!("ITS{tr_no}"),
                    "classId": class_id,
                    "division": division,
                })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let uri = format!("/report?class={class_id}&mode=daily&date=2024-01-08&division=A%20B");
        let html = body_text(send(&app, "GET", &uri, None).await).await;
        assert!(html.contains("Amina"));
        assert!(!html.contains("Bilal"));
        assert!(html.contains("0 present · 1 absent"));
        assert!(html.contains("&amp;division=A%20B\""));
        assert!(html.contains("from=2024-01-08&amp;to=2024-01-08"));

        let uri = format!("/report?class={class_id}&mode=monthly&date=2024-01-08&division=C");
        let html = body_text(send(&app, "GET", &uri, None).await).await;
        assert!(html.contains("Bilal"));
        assert!(!html.contains("Amina"));
        assert!(html.contains("from=2024-01-01&amp;to=2024-01-31"));
    }
}
