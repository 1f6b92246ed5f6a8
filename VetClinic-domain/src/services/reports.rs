//! Spreadsheet-compatible exports
//!
//! Reports are HTML documents made of titled tables. Spreadsheet programs
//! open them when served as `application/vnd.ms-excel`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{
    now_utc, AppointmentFilter, BranchScope, MedicalRecord, MedicationCategory, Role, RecordFilter,
    UsageFilter, UsageRecord,
};
use vet_clinic_data::repository::{
    AppointmentRepository, BranchRepository, OwnerRepository, PatientRepository, RecordRepository,
    UsageRepository,
};

use crate::access::Actor;
use crate::error::ServiceError;
use crate::services::analytics::select_branch;

/// Content type the exports are served with
pub const REPORT_CONTENT_TYPE: &str = "application/vnd.ms-excel";

const EMPTY_SECTION: &str = "No records available";

/// One table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(i64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Bool(bool),
    Empty,
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Text(text) => text.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Date(date) => date.format("%d/%m/%Y").to_string(),
            Cell::DateTime(at) => at.format("%d/%m/%Y %H:%M").to_string(),
            Cell::Bool(true) => "Yes".to_string(),
            Cell::Bool(false) => "No".to_string(),
            Cell::Empty => String::new(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Number(value as i64)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl From<DateTime<Utc>> for Cell {
    fn from(value: DateTime<Utc>) -> Self {
        Cell::DateTime(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Empty, Into::into)
    }
}

/// Build a row from heterogeneous values
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        vec![$(Cell::from($value)),*]
    };
}

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub title: String,
    pub description: Option<String>,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl Section {
    pub fn new(title: &str, headers: &[&'static str]) -> Self {
        Self {
            title: title.to_string(),
            headers: headers.to_vec(),
            ..Self::default()
        }
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Render sections as one HTML document
pub fn render_sections(sections: &[Section]) -> String {
    let mut out = String::from("<html><head><meta charset='utf-8'></head>");
    out.push_str("<body style='font-family:Arial,Helvetica,sans-serif;font-size:13px;'>");

    for section in sections {
        if !section.title.is_empty() {
            out.push_str(&format!("<h2>{}</h2>", escape_html(&section.title)));
        }
        if let Some(description) = &section.description {
            out.push_str(&format!("<p>{}</p>", escape_html(description)));
        }
        out.push_str("<table border='1' cellspacing='0' cellpadding='6' style='border-collapse:collapse;'>");
        if !section.headers.is_empty() {
            out.push_str("<thead><tr>");
            for header in &section.headers {
                out.push_str(&format!("<th>{}</th>", escape_html(header)));
            }
            out.push_str("</tr></thead>");
        }
        out.push_str("<tbody>");
        if section.rows.is_empty() {
            out.push_str(&format!(
                "<tr><td colspan='{}' style='text-align:center;'>{}</td></tr>",
                section.headers.len().max(1),
                EMPTY_SECTION
            ));
        }
        for row in &section.rows {
            out.push_str("<tr>");
            for cell in row {
                out.push_str(&format!("<td>{}</td>", escape_html(&cell.render()).replace('\n', "<br>")));
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody></table>");
    }

    out.push_str("</body></html>");
    out
}

/// Rendered export ready to be sent as an attachment
#[derive(Debug, Clone, Serialize)]
pub struct ReportFile {
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    #[default]
    Weekly,
    Monthly,
}

impl ReportPeriod {
    fn days(&self) -> i64 {
        match self {
            ReportPeriod::Weekly => 7,
            ReportPeriod::Monthly => 30,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReportPeriod::Weekly => "Last 7 days",
            ReportPeriod::Monthly => "Last 30 days",
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ReportPeriod::Weekly => "weekly",
            ReportPeriod::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::IntoParams), into_params(parameter_in = Query))]
pub struct InventoryReportQuery {
    /// `weekly` (default) or `monthly`; anything else falls back to weekly
    pub period: Option<String>,
    /// Branch id or `all`
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::IntoParams), into_params(parameter_in = Query))]
pub struct DossierQuery {
    /// Branch id or `all`
    pub branch: Option<String>,
}

#[async_trait]
pub trait ReportServiceTrait: Send + Sync {
    /// Pharmacy dispensation over the last week or month
    async fn inventory_report(&self, actor: &Actor, query: InventoryReportQuery) -> Result<ReportFile, ServiceError>;

    /// Everything the clinic knows about one owner
    async fn owner_dossier(&self, actor: &Actor, owner_id: i64, query: DossierQuery) -> Result<ReportFile, ServiceError>;
}

pub struct ReportService {
    appointments: AppointmentRepository,
    branches: BranchRepository,
    owners: OwnerRepository,
    patients: PatientRepository,
    records: RecordRepository,
    usage: UsageRepository,
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M").to_string()
}

fn inventory_sections(
    usage: &[UsageRecord],
    generated: DateTime<Utc>,
    period: ReportPeriod,
    branch_name: &str,
) -> Vec<Section> {
    let units: i64 = usage.iter().map(|row| row.quantity).sum();
    let appointments: HashSet<i64> = usage.iter().map(|row| row.appointment_id).collect();
    let patients: HashSet<i64> = usage.iter().map(|row| row.patient_id).collect();
    let vets: HashSet<i64> = usage.iter().filter_map(|row| row.vet_id).collect();

    let mut context = Section::new("Report context", &["Indicator", "Value"]);
    context.rows = vec![
        row!["Generated", generated],
        row!["Period", period.label()],
        row!["Branch", branch_name],
        row!["Records analysed", usage.len()],
        row!["Units dispensed", units],
        row!["Appointments involved", appointments.len()],
        row!["Distinct patients", patients.len()],
        row!["Vets involved", vets.len()],
    ];

    let mut detail = Section::new(
        "Dispensation by appointment",
        &[
            "Branch", "Appointment date", "Recorded", "Status", "Kind", "Vet", "Patient", "Owner",
            "Medication", "Category", "Quantity", "Current stock",
        ],
    );
    let mut ordered: Vec<&UsageRecord> = usage.iter().collect();
    ordered.sort_by(|a, b| {
        b.scheduled_at
            .cmp(&a.scheduled_at)
            .then_with(|| b.recorded_at.cmp(&a.recorded_at))
    });
    detail.rows = ordered
        .iter()
        .map(|row| {
            let date = row.scheduled_at.map_or_else(|| Cell::from(row.requested_date), Cell::from);
            let mut cells = row![row.branch_name.as_str()];
            cells.push(date);
            cells.extend(row![
                row.recorded_at,
                row.appointment_status.label(),
                row.appointment_kind.label(),
                row.vet_name.clone().unwrap_or_else(|| "Unassigned".to_string()),
                row.patient_name.as_str(),
                row.owner_name.as_str(),
                row.medication_name.as_str(),
                row.category.label(),
                row.quantity,
                row.stock_now,
            ]);
            cells
        })
        .collect();

    let mut by_category: BTreeMap<MedicationCategory, (HashSet<i64>, i64)> = BTreeMap::new();
    for row in usage {
        let entry = by_category.entry(row.category).or_default();
        entry.0.insert(row.medication_id);
        entry.1 += row.quantity;
    }
    let mut categories: Vec<(MedicationCategory, usize, i64)> = by_category
        .into_iter()
        .map(|(category, (items, units))| (category, items.len(), units))
        .collect();
    categories.sort_by(|a, b| b.2.cmp(&a.2));
    let mut category_section = Section::new("Summary by category", &["Category", "Items", "Units dispensed"]);
    category_section.rows = categories
        .into_iter()
        .map(|(category, items, units)| row![category.label(), items, units])
        .collect();

    struct MedicationTotals<'a> {
        name: &'a str,
        category: MedicationCategory,
        units: i64,
        appointments: HashSet<i64>,
        patients: HashSet<i64>,
        stock: i64,
    }
    let mut by_medication: HashMap<i64, MedicationTotals<'_>> = HashMap::new();
    for row in usage {
        let entry = by_medication.entry(row.medication_id).or_insert_with(|| MedicationTotals {
            name: &row.medication_name,
            category: row.category,
            units: 0,
            appointments: HashSet::new(),
            patients: HashSet::new(),
            stock: row.stock_now,
        });
        entry.units += row.quantity;
        entry.appointments.insert(row.appointment_id);
        entry.patients.insert(row.patient_id);
    }
    let mut medications: Vec<MedicationTotals<'_>> = by_medication.into_values().collect();
    medications.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| a.name.cmp(b.name)));
    let mut top = Section::new(
        "Top dispensed medications",
        &["Medication", "Category", "Units", "Appointments", "Patients", "Current stock"],
    );
    top.rows = medications
        .iter()
        .map(|m| row![m.name, m.category.label(), m.units, m.appointments.len(), m.patients.len(), m.stock])
        .collect();

    vec![context, detail, category_section, top]
}

impl ReportService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            appointments: AppointmentRepository::new(pool.clone()),
            branches: BranchRepository::new(pool.clone()),
            owners: OwnerRepository::new(pool.clone()),
            patients: PatientRepository::new(pool.clone()),
            records: RecordRepository::new(pool.clone()),
            usage: UsageRepository::new(pool),
        }
    }

    /// Branch a dossier is restricted to, with its display name
    fn dossier_branch(&self, actor: &Actor, raw: Option<&str>) -> Result<(Option<i64>, String), ServiceError> {
        let raw = raw.map(str::trim).filter(|r| !r.is_empty() && *r != "all");
        if actor.is_superuser {
            return match raw {
                None => Ok((None, "All branches".to_string())),
                Some(raw) => {
                    let id: i64 = raw
                        .parse()
                        .map_err(|_| ServiceError::validation("The selected branch is not valid"))?;
                    let branch = self
                        .branches
                        .get(id)?
                        .ok_or_else(|| ServiceError::not_found("The selected branch does not exist"))?;
                    Ok((Some(branch.id), branch.name))
                }
            };
        }

        let branch_id = actor
            .branch_id
            .ok_or_else(|| ServiceError::forbidden("You have no branch assigned"))?;
        if raw.is_some_and(|r| r != branch_id.to_string()) {
            warn!("Admin {} asked for a dossier outside their branch", actor.username);
            return Err(ServiceError::forbidden("You cannot view dossiers of other branches"));
        }
        let name = self
            .branches
            .get(branch_id)?
            .map_or_else(|| "No branch assigned".to_string(), |b| b.name);
        Ok((Some(branch_id), name))
    }
}

#[async_trait]
impl ReportServiceTrait for ReportService {
    async fn inventory_report(&self, actor: &Actor, query: InventoryReportQuery) -> Result<ReportFile, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let period = match query.period.as_deref().map(str::trim) {
            Some("monthly") => ReportPeriod::Monthly,
            _ => ReportPeriod::Weekly,
        };
        let selection = select_branch(actor, &self.branches, query.branch.as_deref())?;
        let branch_name = match (&selection.selected, selection.scope) {
            (Some(branch), _) => branch.name.clone(),
            (None, BranchScope::Nothing) => "No branch assigned".to_string(),
            (None, _) => "All branches".to_string(),
        };

        let generated = now_utc();
        let usage = self.usage.list(&UsageFilter {
            scope: selection.scope,
            since: Some(generated - Duration::days(period.days())),
            owner_id: None,
        })?;
        info!(
            "Inventory report ({}) for {} with {} dispensations",
            period.code(),
            branch_name,
            usage.len()
        );

        Ok(ReportFile {
            file_name: format!("inventory_report_{}_{}.xls", period.code(), stamp(generated)),
            content: render_sections(&inventory_sections(&usage, generated, period, &branch_name)),
        })
    }

    async fn owner_dossier(&self, actor: &Actor, owner_id: i64, query: DossierQuery) -> Result<ReportFile, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let owner = self
            .owners
            .get(owner_id)?
            .ok_or_else(|| ServiceError::not_found("Owner not found"))?;
        let (branch_id, branch_name) = self.dossier_branch(actor, query.branch.as_deref())?;
        let scope = branch_id.map_or(BranchScope::All, BranchScope::Branch);

        let mut appointments = self.appointments.list(&AppointmentFilter {
            owner_id: Some(owner.id),
            ..AppointmentFilter::scoped(scope)
        })?;
        if !actor.is_superuser && appointments.is_empty() {
            return Err(ServiceError::not_found("This owner has no appointments in your branch"));
        }
        appointments.sort_by(|a, b| {
            b.scheduled_at
                .cmp(&a.scheduled_at)
                .then_with(|| b.requested_date.cmp(&a.requested_date))
        });
        let appointment_ids: HashSet<i64> = appointments.iter().map(|a| a.id).collect();
        let patient_ids: HashSet<i64> = appointments.iter().map(|a| a.patient_id).collect();

        let pets: Vec<_> = self
            .patients
            .list_by_owner(owner.id)?
            .into_iter()
            .filter(|p| branch_id.is_none() || patient_ids.contains(&p.id))
            .collect();
        let records: Vec<_> = self
            .records
            .list(&RecordFilter {
                owner_id: Some(owner.id),
                scope,
                ..RecordFilter::default()
            })?
            .into_iter()
            .filter(|r| branch_id.is_none() || r.appointment_id.map_or(true, |id| appointment_ids.contains(&id)))
            .collect();
        let usage = self.usage.list(&UsageFilter {
            scope,
            since: None,
            owner_id: Some(owner.id),
        })?;
        let generated = now_utc();

        let not_recorded = |value: &str, fallback: &str| {
            if value.trim().is_empty() {
                fallback.to_string()
            } else {
                value.to_string()
            }
        };
        let phone = if owner.phone.is_empty() { &owner.user_phone } else { &owner.phone };

        let mut card = Section::new("Owner card", &["Field", "Detail"]);
        card.rows = vec![
            row!["Owner", owner.display_name()],
            row!["Email", owner.email.as_str()],
            row!["Phone", not_recorded(phone, "Not provided")],
            row!["Address", not_recorded(&owner.address, "Not recorded")],
            row!["City", not_recorded(&owner.city, "Not recorded")],
            row!["Branch", branch_name.as_str()],
            row!["Generated", generated],
        ];

        let mut pet_section = Section::new(
            "Registered pets",
            &["Name", "Species", "Breed", "Sex", "Birth date", "Vaccines", "Allergies"],
        );
        pet_section.rows = pets
            .iter()
            .map(|p| {
                row![
                    p.name.as_str(),
                    p.species.as_str(),
                    not_recorded(&p.breed, "-"),
                    p.sex.as_str(),
                    p.birth_date,
                    not_recorded(&p.vaccines, "None recorded"),
                    not_recorded(&p.allergies, "None recorded"),
                ]
            })
            .collect();

        let mut used_by_appointment: HashMap<i64, Vec<String>> = HashMap::new();
        for row in &usage {
            used_by_appointment
                .entry(row.appointment_id)
                .or_default()
                .push(format!("{} (x{})", row.medication_name, row.quantity));
        }
        let records_by_appointment: HashMap<i64, &MedicalRecord> = records
            .iter()
            .filter_map(|r| r.appointment_id.map(|id| (id, r)))
            .collect();

        let mut appointment_section = Section::new(
            "Appointments",
            &["Date", "Status", "Kind", "Branch", "Vet", "Patient", "Medications used", "Diagnosis", "Treatment"],
        );
        appointment_section.rows = appointments
            .iter()
            .map(|a| {
                let record = records_by_appointment.get(&a.id);
                let date = a.scheduled_at.map_or_else(|| Cell::from(a.requested_date), Cell::from);
                let mut cells = vec![date];
                cells.extend(row![
                    a.status.label(),
                    a.kind.label(),
                    a.branch_name.as_str(),
                    a.vet_name.clone().unwrap_or_else(|| "Unassigned".to_string()),
                    a.patient_name.as_str(),
                    used_by_appointment
                        .get(&a.id)
                        .map_or_else(|| "None recorded".to_string(), |used| used.join(", ")),
                    record.map_or("-", |r| r.diagnosis.as_str()),
                    record.map_or("-", |r| r.treatment.as_str()),
                ]);
                cells
            })
            .collect();

        let mut history = Section::new(
            "Clinical history",
            &["Date", "Patient", "Professional", "Diagnosis", "Treatment", "Notes"],
        );
        history.rows = records
            .iter()
            .map(|r| {
                row![
                    r.recorded_at,
                    r.patient_name.as_str(),
                    r.vet_name.clone().unwrap_or_else(|| "Unassigned".to_string()),
                    r.diagnosis.as_str(),
                    r.treatment.as_str(),
                    not_recorded(&r.notes, "-"),
                ]
            })
            .collect();

        let mut administered: BTreeMap<(String, MedicationCategory), (i64, HashSet<i64>)> = BTreeMap::new();
        for row in &usage {
            let entry = administered
                .entry((row.medication_name.clone(), row.category))
                .or_default();
            entry.0 += row.quantity;
            entry.1.insert(row.appointment_id);
        }
        let mut administered: Vec<_> = administered.into_iter().collect();
        administered.sort_by(|a, b| (b.1).0.cmp(&(a.1).0));
        let mut medication_section = Section::new(
            "Medications administered",
            &["Medication", "Category", "Units", "Appointments"],
        );
        medication_section.rows = administered
            .into_iter()
            .map(|((name, category), (units, appointments))| row![name, category.label(), units, appointments.len()])
            .collect();

        info!("Owner dossier for {} generated by {}", owner.username, actor.username);
        Ok(ReportFile {
            file_name: format!("dossier_{}_{}.xls", owner.username, stamp(generated)),
            content: render_sections(&[card, pet_section, appointment_section, history, medication_section]),
        })
    }
}

pub fn create_default_report_service(pool: DatabasePool) -> Arc<dyn ReportServiceTrait> {
    Arc::new(ReportService::new(pool))
}
