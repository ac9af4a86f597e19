use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::dates::{self, ReportMode};
use crate::report::{DailyReport, RangeSummary, SortDirection, StudentQuery};
use crate::sheet::{SheetMode, SheetRow, SheetState};
use crate::types::{AttendanceStatus, Class, Student};

/// One class card on the dashboard
#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub class: Class,
    pub student_count: usize,
    pub recent_dates: Vec<String>,
}

pub struct SetupView<'a> {
    pub classes: &'a [Class],
    pub selected_class: Option<&'a str>,
    pub students: &'a [Student],
    pub query: &'a StudentQuery,
    pub max_classes: usize,
}

pub struct SheetView<'a> {
    pub class: &'a Class,
    pub date: &'a str,
    pub division: Option<&'a str>,
    pub divisions: &'a [String],
    pub state: SheetState,
    pub rows: &'a [SheetRow],
}

pub enum ReportBody {
    Daily(DailyReport),
    Range(RangeSummary),
}

impl ReportBody {
    /// First and last date the report covers
    pub fn bounds(&self) -> (&str, &str) {
        match self {
            ReportBody::Daily(report) => (report.date.as_str(), report.date.as_str()),
            ReportBody::Range(summary) => (summary.start.as_str(), summary.end.as_str()),
        }
    }
}

pub struct ReportView<'a> {
    pub classes: &'a [Class],
    pub class: Option<&'a Class>,
    pub division: Option<&'a str>,
    pub divisions: &'a [String],
    pub mode: ReportMode,
    pub anchor: &'a str,
    pub body: Option<ReportBody>,
}

/// Percent-encode a query parameter value (RFC 3986 unreserved characters pass through)
fn query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn export_href(start: &str, end: &str, class_id: &str, division: Option<&str>) -> String {
    let mut href = format!(
        "/api/export?from={}&to={}&class={}",
        query_value(start),
        query_value(end),
        query_value(class_id)
    );
    if let Some(division) = division {
        href.push_str("&division=");
        href.push_str(&query_value(division));
    }
    href
}

fn layout(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) " · Appello" }
                style { (PreEscaped(CSS)) }
            }
            body {
                nav.topbar {
                    a.brand href="/" { "Appello" }
                    a href="/setup" { "Setup" }
                    a href="/attendance" { "Attendance" }
                    a href="/report" { "Reports" }
                }
                div.container {
                    h1 { (title) }
                    div.notice #notice hidden {}
                    (content)
                }
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    }
}

pub fn render_dashboard(classes: &[ClassSummary], today: &str) -> Markup {
    layout(
        "Dashboard",
        html! {
            @if classes.is_empty() {
                div.empty-state {
                    p { "No classes yet." }
                    a.button href="/setup" { "Create a class" }
                }
            } @else {
                div.cards {
                    @for summary in classes {
                        div.card {
                            h2 { (summary.class.name) }
                            p.muted { (summary.student_count) " students" }
                            @if summary.recent_dates.is_empty() {
                                p.muted { "No attendance taken yet" }
                            } @else {
                                ul.dates {
                                    @for date in &summary.recent_dates {
                                        li {
                                            a href={"/report?class=" (summary.class.id) "&mode=daily&date=" (date) } {
                                                (pretty_date(date))
                                            }
                                        }
                                    }
                                }
                            }
                            div.actions {
                                a.button href={"/attendance?class=" (summary.class.id) "&date=" (today)} { "Take attendance" }
                                a.button.secondary href={"/report?class=" (summary.class.id)} { "Reports" }
                            }
                        }
                    }
                }
            }
        },
    )
}

pub fn render_setup(view: &SetupView) -> Markup {
    let at_cap = view.classes.len() >= view.max_classes;

    layout(
        "Setup",
        html! {
            section {
                h2 { "Classes" }
                table {
                    thead { tr { th { "Name" } th {} } }
                    tbody {
                        @for class in view.classes {
                            tr.selected[view.selected_class == Some(class.id.as_str())] {
                                td { a href={"/setup?class=" (class.id)} { (class.name) } }
                                td.row-actions {
                                    button.secondary data-prompt="New class name" data-field="name"
                                        data-method="PUT" data-action={"/api/classes/" (class.id)} { "Rename" }
                                    button.danger data-method="DELETE" data-action={"/api/classes/" (class.id)}
                                        data-confirm="Delete this class with all its students and attendance?" { "Delete" }
                                }
                            }
                        }
                    }
                }
                @if at_cap {
                    p.muted { "Maximum of " (view.max_classes) " classes allowed" }
                } @else {
                    form.inline data-api="/api/classes" {
                        input name="name" placeholder="Class name" required;
                        button type="submit" { "Add class" }
                    }
                }
            }

            @if let Some(class_id) = view.selected_class {
                section {
                    h2 { "Students" }
                    form.inline data-api="/api/students" {
                        input type="hidden" name="classId" value=(class_id);
                        input name="trNo" placeholder="Tr. No." required;
                        input name="name" placeholder="Name" required;
                        input name="itsNo" placeholder="ITS No." required;
                        input name="division" placeholder="Division";
                        input name="subject" placeholder="Subject";
                        button type="submit" { "Add student" }
                    }
                    form.inline method="get" action="/setup" {
                        input type="hidden" name="class" value=(class_id);
                        input type="search" name="search" placeholder="Search name, Tr. No. or ITS No."
                            value=(view.query.search.as_deref().unwrap_or(""));
                        button.secondary type="submit" { "Search" }
                    }
                    (render_student_table(class_id, view.students, view.query))
                }
            }
        },
    )
}

fn render_student_table(class_id: &str, students: &[Student], query: &StudentQuery) -> Markup {
    html! {
        @if students.is_empty() {
            div.empty-state { p { "No students found." } }
        } @else {
            table {
                thead {
                    tr {
                        @for field in crate::report::SortField::ALL {
                            @let direction = query.direction.next(query.sort, field);
                            th {
                                a href={"/setup?class=" (class_id) "&sort=" (field.as_str()) "&direction=" (direction.as_str())} {
                                    (field.label())
                                    @if query.sort == field {
                                        @match query.direction {
                                            SortDirection::Asc => { " ▲" }
                                            SortDirection::Desc => { " ▼" }
                                        }
                                    }
                                }
                            }
                        }
                        th {}
                    }
                }
                tbody {
                    @for student in students {
                        tr {
                            td { (student.tr_no) }
                            td { (student.name) }
                            td { (student.its_no) }
                            td { (student.division.as_deref().unwrap_or("")) }
                            td { (student.subject.as_deref().unwrap_or("")) }
                            td.row-actions {
                                button.danger data-method="DELETE" data-action={"/api/students/" (student.id)}
                                    data-confirm="Delete this student and their attendance?" { "Delete" }
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn render_class_picker(classes: &[Class], target: &str, today: &str) -> Markup {
    layout(
        "Choose a class",
        html! {
            @if classes.is_empty() {
                div.empty-state {
                    p { "No classes yet." }
                    a.button href="/setup" { "Create a class" }
                }
            } @else {
                ul.dates {
                    @for class in classes {
                        li { a href={(target) "?class=" (class.id) "&date=" (today)} { (class.name) } }
                    }
                }
            }
        },
    )
}

pub fn render_sheet(view: &SheetView) -> Markup {
    let base = format!("/api/sheet/{}/{}", view.class.id, view.date);
    let division_query = view
        .division
        .map(|d| format!("?division={}", query_value(d)))
        .unwrap_or_default();
    let present = view
        .rows
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();

    layout(
        &format!("Attendance · {}", view.class.name),
        html! {
            form.inline method="get" action="/attendance" {
                input type="hidden" name="class" value=(view.class.id);
                input type="date" name="date" value=(view.date);
                @if !view.divisions.is_empty() {
                    select name="division" {
                        option value="" { "All divisions" }
                        @for division in view.divisions {
                            option value=(division) selected[view.division == Some(division.as_str())] { (division) }
                        }
                    }
                }
                button.secondary type="submit" { "Set date" }
            }
            p.muted { (pretty_date(view.date)) }

            @match view.state {
                SheetState::Ready(mode) => {
                    p.badge {
                        @match mode {
                            SheetMode::NewSheet => { "New sheet" }
                            SheetMode::Edit => { "Editing existing sheet" }
                        }
                        " · " (present) " / " (view.rows.len()) " present"
                    }
                    form.inline data-api={(base) "/roll" (division_query)} {
                        input name="trNo" placeholder="Roll number (Tr. No.)" autofocus required;
                        button type="submit" { "Mark present" }
                    }
                    div.actions {
                        button data-method="POST" data-action={(base) "/all-present" (division_query)} { "Mark all present" }
                        button.danger data-method="DELETE" data-action=(base)
                            data-confirm="Delete all attendance records for this date?" { "Delete all" }
                    }
                    table {
                        thead { tr { th { "Tr. No." } th { "Name" } th { "Division" } th { "Status" } } }
                        tbody {
                            @for row in view.rows {
                                tr {
                                    td { (row.student.tr_no) }
                                    td { (row.student.name) }
                                    td { (row.student.division.as_deref().unwrap_or("")) }
                                    td {
                                        button.status.present[row.status == AttendanceStatus::Present]
                                            data-method="POST" data-action={(base) "/toggle" (division_query)}
                                            data-body={"{\"studentId\":\"" (row.student.id) "\"}"} {
                                            (row.status.as_str())
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                _ => {
                    div.empty-state {
                        p { "Attendance for this date has not been started." }
                        button data-method="POST" data-action={(base) "/refresh" (division_query)} { "Start attendance" }
                    }
                }
            }
        },
    )
}

pub fn render_report(view: &ReportView) -> Markup {
    layout(
        "Reports",
        html! {
            form.inline method="get" action="/report" {
                select name="class" {
                    @for class in view.classes {
                        option value=(class.id) selected[view.class.map(|c| c.id == class.id).unwrap_or(false)] { (class.name) }
                    }
                }
                select name="mode" {
                    @for mode in ReportMode::ALL {
                        option value=(mode.as_str()) selected[mode == view.mode] { (mode.as_str()) }
                    }
                }
                @if !view.divisions.is_empty() {
                    select name="division" {
                        option value="" { "All divisions" }
                        @for division in view.divisions {
                            option value=(division) selected[view.division == Some(division.as_str())] { (division) }
                        }
                    }
                }
                input type="date" name="date" value=(view.anchor);
                button.secondary type="submit" { "Show" }
            }

            @match &view.body {
                None => {
                    div.empty-state { p { "Choose a class to see its report." } }
                }
                Some(body) => {
                    @if let Some(class) = view.class {
                        @let (start, end) = body.bounds();
                        p {
                            a.button.secondary href=(export_href(start, end, &class.id, view.division)) {
                                "Export CSV"
                            }
                        }
                    }
                    @match body {
                        ReportBody::Daily(report) => {
                            (render_daily(report))
                        }
                        ReportBody::Range(summary) => {
                            (render_range(summary))
                        }
                    }
                }
            }
        },
    )
}

fn render_daily(report: &DailyReport) -> Markup {
    html! {
        h2 { (pretty_date(&report.date)) }
        p.badge {
            (report.present.len()) " present · "
            (report.absent.len()) " absent · "
            (report.total()) " students"
        }
        div.columns {
            div {
                h3 { "Present" }
                ul { @for s in &report.present { li { (s.tr_no) " · " (s.name) } } }
            }
            div {
                h3 { "Absent" }
                ul { @for s in &report.absent { li { (s.tr_no) " · " (s.name) } } }
            }
        }
    }
}

fn render_range(summary: &RangeSummary) -> Markup {
    html! {
        h2 { (pretty_date(&summary.start)) " to " (pretty_date(&summary.end)) }
        p.badge {
            (summary.total_days) " of " (summary.calendar_days()) " days recorded · "
            (summary.total_present) " present · "
            (summary.total_absent) " absent"
        }
        table {
            thead {
                tr { th { "Tr. No." } th { "Name" } th { "Present" } th { "Absent" } th { "Attendance" } }
            }
            tbody {
                @for row in &summary.students {
                    tr {
                        td { (row.student.tr_no) }
                        td { (row.student.name) }
                        td { (row.present_days) }
                        td { (row.absent_days) }
                        td { (format!("{:.1}%", row.attendance_rate)) }
                    }
                }
            }
        }
    }
}

fn pretty_date(date: &str) -> String {
    match dates::parse_date(date) {
        Ok(d) => format!("{}, {}", dates::day_name(d), dates::formatted_date(d)),
        Err(_) => date.to_string(),
    }
}

const CSS: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    background: #f5f6f8;
    color: #1d2330;
    line-height: 1.5;
}

.topbar {
    display: flex;
    gap: 24px;
    align-items: center;
    padding: 14px 24px;
    background: #1d2330;
}

.topbar a { color: #cfd6e4; text-decoration: none; font-weight: 600; }
.topbar a.brand { color: #fff; font-size: 1.2em; margin-right: 16px; }

.container { max-width: 1000px; margin: 0 auto; padding: 32px 24px 60px; }

h1 { font-size: 2em; margin-bottom: 20px; }
h2 { font-size: 1.3em; margin: 24px 0 12px; }
h3 { font-size: 1.05em; margin-bottom: 8px; }

section { margin-bottom: 36px; }

.muted { color: #6b7385; }

.badge {
    display: inline-block;
    background: #e3e8f3;
    border-radius: 12px;
    padding: 4px 12px;
    margin: 8px 0 16px;
    font-size: 0.9em;
}

.notice { padding: 10px 14px; border-radius: 6px; margin-bottom: 16px; }
.notice.error { background: #fde2e2; color: #8a1c1c; }
.notice.info { background: #e2f3e6; color: #1c5a2b; }

.cards { display: grid; grid-template-columns: repeat(auto-fill, minmax(280px, 1fr)); gap: 20px; }
.card { background: #fff; border-radius: 10px; padding: 20px; box-shadow: 0 1px 3px rgba(0,0,0,0.08); }
.card h2 { margin-top: 0; }

.actions { display: flex; gap: 10px; margin: 12px 0; flex-wrap: wrap; }

.columns { display: grid; grid-template-columns: 1fr 1fr; gap: 24px; }

ul.dates { list-style: none; margin: 8px 0; }
ul.dates li { padding: 2px 0; }

table { width: 100%; border-collapse: collapse; background: #fff; margin-top: 12px; }
th, td { text-align: left; padding: 8px 10px; border-bottom: 1px solid #e6e9ef; }
th a { color: inherit; text-decoration: none; }
tr.selected { background: #eef3ff; }
td.row-actions { text-align: right; white-space: nowrap; }

form.inline { display: flex; gap: 8px; flex-wrap: wrap; margin: 12px 0; }

input, select {
    padding: 7px 10px;
    border: 1px solid #c9cfdb;
    border-radius: 6px;
    font-size: 0.95em;
}

button, a.button {
    display: inline-block;
    padding: 7px 14px;
    border: none;
    border-radius: 6px;
    background: #2f6fed;
    color: #fff;
    font-size: 0.95em;
    cursor: pointer;
    text-decoration: none;
}

button.secondary, a.button.secondary { background: #e3e8f3; color: #1d2330; }
button.danger { background: #d64545; }

button.status { background: #d64545; min-width: 80px; text-transform: capitalize; }
button.status.present { background: #2f9e55; }

.empty-state { padding: 40px 20px; text-align: center; color: #6b7385; }
.empty-state p { margin-bottom: 14px; }

@media (max-width: 768px) {
    .columns { grid-template-columns: 1fr; }
    .container { padding: 20px 12px 40px; }
}
"#;

const JAVASCRIPT: &str = r#"
function notify(message, kind) {
    const box = document.getElementById('notice');
    box.textContent = message;
    box.className = 'notice ' + kind;
    box.hidden = false;
}

async function call(method, url, body) {
    const res = await fetch(url, {
        method,
        headers: { 'Content-Type': 'application/json' },
        body: body ? JSON.stringify(body) : undefined,
    });
    const text = await res.text();
    const data = text ? JSON.parse(text) : null;
    if (!res.ok) {
        throw new Error((data && data.error) || res.statusText);
    }
    return data;
}

// Buttons carrying data-action call the API, then reload the page
document.querySelectorAll('[data-action]').forEach(el => {
    el.addEventListener('click', async () => {
        if (el.dataset.confirm && !confirm(el.dataset.confirm)) return;
        let body = el.dataset.body ? JSON.parse(el.dataset.body) : null;
        if (el.dataset.prompt) {
            const value = prompt(el.dataset.prompt);
            if (!value) return;
            body = { [el.dataset.field]: value };
        }
        try {
            await call(el.dataset.method || 'POST', el.dataset.action, body);
            location.reload();
        } catch (e) {
            notify(e.message, 'error');
        }
    });
});

// Forms carrying data-api post their fields as JSON
document.querySelectorAll('form[data-api]').forEach(form => {
    form.addEventListener('submit', async ev => {
        ev.preventDefault();
        const body = Object.fromEntries(new FormData(form).entries());
        try {
            const data = await call(form.dataset.method || 'POST', form.dataset.api, body);
            if (data && data.outcome === 'notFound') {
                notify('Student with Tr. No. ' + data.trNo + ' not found', 'error');
                form.reset();
                return;
            }
            location.reload();
        } catch (e) {
            notify(e.message, 'error');
        }
    });
});
"#;
