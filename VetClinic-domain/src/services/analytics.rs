//! Team workload, appointment indicators and pharmacy usage analytics

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{
    now_utc, Appointment, AppointmentFilter, AppointmentKind, AppointmentStatus, Branch,
    BranchScope, Medication, MedicationCategory, OwnerActivity, OwnerActivityFilter, Role,
    UsageFilter, UsageRecord, User,
};
use vet_clinic_data::repository::{
    AppointmentRepository, BranchRepository, MedicationRepository, OwnerRepository, UsageRepository,
    UserRepository,
};

use crate::access::{manageable_branches, Actor};
use crate::error::ServiceError;
use crate::services::appointment::AppointmentStats;

/// Whole percentage of `part` over `whole`, 0 when `whole` is 0
pub(crate) fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        (part as f64 * 100.0 / whole as f64).round() as u32
    }
}

/// Percentage with one decimal
pub(crate) fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 * 1000.0 / whole as f64).round() / 10.0
    }
}

/// Branches an admin works with and the one picked for a view
#[derive(Debug, Clone)]
pub(crate) struct BranchSelection {
    pub branches: Vec<Branch>,
    pub selected: Option<Branch>,
    pub scope: BranchScope,
}

/// Resolve a `branch` parameter that is `all`, empty or a branch id.
/// Superusers may pick any branch or all of them; other admins always get
/// their own branch.
pub(crate) fn select_branch(
    actor: &Actor,
    branches: &BranchRepository,
    raw: Option<&str>,
) -> Result<BranchSelection, ServiceError> {
    let available = manageable_branches(actor, branches)?;
    let raw = raw.map(str::trim).filter(|r| !r.is_empty() && *r != "all");

    if !actor.is_superuser {
        let selected = actor
            .branch_id
            .and_then(|id| available.iter().find(|b| b.id == id).cloned());
        if let Some(requested) = raw {
            if selected.as_ref().map(|b| b.id.to_string()) != Some(requested.to_string()) {
                warn!("Admin {} asked for branch '{}'", actor.username, requested);
                return Err(ServiceError::forbidden("You cannot view the data of that branch"));
            }
        }
        let scope = selected.as_ref().map_or(BranchScope::Nothing, |b| BranchScope::Branch(b.id));
        return Ok(BranchSelection {
            branches: available,
            selected,
            scope,
        });
    }

    let selected = match raw {
        Some(raw) => Some(
            available
                .iter()
                .find(|b| b.id.to_string() == raw)
                .cloned()
                .ok_or_else(|| ServiceError::validation("The selected branch is not valid"))?,
        ),
        None if available.len() == 1 => available.first().cloned(),
        None => None,
    };
    let scope = selected.as_ref().map_or(BranchScope::All, |b| BranchScope::Branch(b.id));
    Ok(BranchSelection {
        branches: available,
        selected,
        scope,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct TeamSummary {
    pub vets: usize,
    pub pending: usize,
    pub scheduled: usize,
    pub attended: usize,
    pub cancelled: usize,
    pub in_progress: usize,
    /// Attended over attended plus scheduled
    pub fulfilment_rate: u32,
    /// Scheduled in the next seven days
    pub this_week: usize,
    pub today: usize,
    pub without_time: usize,
    pub week_percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VetWorkload {
    pub vet: User,
    pub name: String,
    pub initials: String,
    pub branch_name: String,
    pub total: usize,
    pub pending: usize,
    pub scheduled: usize,
    pub attended: usize,
    pub cancelled: usize,
    pub in_progress: usize,
    pub this_week: usize,
    pub upcoming: Vec<Appointment>,
    pub attendance_rate: u32,
    /// In-progress load relative to the busiest vet
    pub load_percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VetTeamReport {
    pub summary: TeamSummary,
    pub next_slots: Vec<Appointment>,
    pub recent_requests: Vec<Appointment>,
    pub vets: Vec<VetWorkload>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct IndicatorSummary {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub stats: AppointmentStats,
    pub resolution_rate: f64,
    pub confirmation_rate: f64,
    pub cancellation_rate: f64,
    /// Days from the requested date to the confirmed time
    pub average_confirmation_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub label: String,
    pub requested: usize,
    pub scheduled: usize,
    pub attended: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct KindCount {
    pub kind: AppointmentKind,
    pub label: String,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VetPerformance {
    pub vet_id: i64,
    pub name: String,
    pub total: usize,
    pub attended: usize,
    pub scheduled: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct OwnerCount {
    pub owner_id: i64,
    pub name: String,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Indicators {
    pub branch_id: Option<i64>,
    pub summary: IndicatorSummary,
    pub daily: Vec<DailyPoint>,
    pub top_kinds: Vec<KindCount>,
    pub vet_performance: Vec<VetPerformance>,
    pub top_owners: Vec<OwnerCount>,
    pub week_agenda: Vec<Appointment>,
    pub unassigned: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum UsagePeriod {
    Day,
    Week,
    #[default]
    Month,
}

impl UsagePeriod {
    pub fn days(&self) -> i64 {
        match self {
            UsagePeriod::Day => 1,
            UsagePeriod::Week => 7,
            UsagePeriod::Month => 30,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UsagePeriod::Day => "Last 24 hours",
            UsagePeriod::Week => "Last 7 days",
            UsagePeriod::Month => "Last 30 days",
        }
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("day") => UsagePeriod::Day,
            Some("week") => UsagePeriod::Week,
            _ => UsagePeriod::Month,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::IntoParams), into_params(parameter_in = Query))]
pub struct AnalyticsQuery {
    /// Branch id or `all` (superuser only)
    pub branch: Option<String>,
    /// `day`, `week` or `month` (default)
    pub usage_period: Option<String>,
    /// Owner name, username or phone
    pub owner_q: Option<String>,
    /// `all` (default), `30`, `90` or `365` days of clinical activity
    pub record_period: Option<String>,
    /// Owners whose pets received this medication
    pub medication_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct CategoryUsage {
    pub category: MedicationCategory,
    pub label: String,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct MedicationUsage {
    pub medication_id: i64,
    pub name: String,
    pub category: String,
    pub branch_name: String,
    pub total: i64,
    pub patients: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VetOutput {
    pub vet_id: i64,
    pub name: String,
    pub branch_name: String,
    pub attended: usize,
    pub patients: usize,
    pub units_dispensed: i64,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct AdminAnalytics {
    pub branches: Vec<Branch>,
    pub branch: Option<Branch>,
    /// A superuser with several branches may look at all of them at once
    pub all_branches: bool,
    pub usage_period: UsagePeriod,
    pub usage_period_label: String,
    pub units_dispensed: i64,
    pub owners_in_period: usize,
    pub vets_in_period: usize,
    pub usage_by_category: Vec<CategoryUsage>,
    pub top_medications: Vec<MedicationUsage>,
    pub vet_output: Vec<VetOutput>,
    pub owners: Vec<OwnerActivity>,
    /// Medications offered as owner filter
    pub medications: Vec<Medication>,
}

#[async_trait]
pub trait AnalyticsServiceTrait: Send + Sync {
    async fn vet_team(&self, actor: &Actor) -> Result<VetTeamReport, ServiceError>;

    async fn indicators(&self, actor: &Actor) -> Result<Indicators, ServiceError>;

    async fn admin_analytics(&self, actor: &Actor, query: AnalyticsQuery) -> Result<AdminAnalytics, ServiceError>;
}

pub struct AnalyticsService {
    appointments: AppointmentRepository,
    branches: BranchRepository,
    medications: MedicationRepository,
    owners: OwnerRepository,
    usage: UsageRepository,
    users: UserRepository,
}

fn count_status(appointments: &[&Appointment], status: AppointmentStatus) -> usize {
    appointments.iter().filter(|a| a.status == status).count()
}

fn in_week(appointment: &Appointment, now: DateTime<Utc>) -> bool {
    appointment.status == AppointmentStatus::Scheduled
        && appointment
            .scheduled_at
            .map_or(false, |at| at >= now && at <= now + Duration::days(7))
}

pub(crate) fn vet_workload(vet: &User, appointments: &[Appointment], now: DateTime<Utc>) -> VetWorkload {
    let own: Vec<&Appointment> = appointments.iter().filter(|a| a.vet_id == Some(vet.id)).collect();
    let scheduled = count_status(&own, AppointmentStatus::Scheduled);
    let pending = count_status(&own, AppointmentStatus::Pending);
    let attended = count_status(&own, AppointmentStatus::Attended);

    let mut confirmed: Vec<&Appointment> = own
        .iter()
        .copied()
        .filter(|a| a.status == AppointmentStatus::Scheduled && a.scheduled_at.is_some())
        .collect();
    confirmed.sort_by_key(|a| a.scheduled_at);
    let mut without_time: Vec<&Appointment> = own
        .iter()
        .copied()
        .filter(|a| a.status == AppointmentStatus::Scheduled && a.scheduled_at.is_none())
        .collect();
    without_time.sort_by_key(|a| a.requested_date);

    VetWorkload {
        name: vet.display_name(),
        initials: vet.initials(),
        branch_name: vet.branch_name.clone().unwrap_or_default(),
        total: own.len(),
        pending,
        scheduled,
        attended,
        cancelled: count_status(&own, AppointmentStatus::Cancelled),
        in_progress: scheduled + pending,
        this_week: own.iter().filter(|a| in_week(a, now)).count(),
        upcoming: confirmed
            .into_iter()
            .chain(without_time)
            .take(5)
            .cloned()
            .collect(),
        attendance_rate: percent(attended, scheduled + attended),
        load_percentage: 0,
        vet: vet.clone(),
    }
}

pub(crate) fn daily_series(appointments: &[Appointment], today: NaiveDate) -> Vec<DailyPoint> {
    (0..7)
        .rev()
        .map(|offset| {
            let day = today - Duration::days(offset);
            let on_day = |status: AppointmentStatus| {
                appointments
                    .iter()
                    .filter(|a| a.status == status && a.scheduled_at.map(|at| at.date_naive()) == Some(day))
                    .count()
            };
            DailyPoint {
                date: day,
                label: day.format("%d/%m").to_string(),
                requested: appointments.iter().filter(|a| a.requested_date == day).count(),
                scheduled: on_day(AppointmentStatus::Scheduled),
                attended: on_day(AppointmentStatus::Attended),
                cancelled: on_day(AppointmentStatus::Cancelled),
            }
        })
        .collect()
}

fn record_period_start(raw: Option<&str>, today: NaiveDate) -> Option<NaiveDate> {
    match raw.map(str::trim) {
        Some("30") => Some(today - Duration::days(30)),
        Some("90") => Some(today - Duration::days(90)),
        Some("365") => Some(today - Duration::days(365)),
        _ => None,
    }
}

pub(crate) fn usage_by_category(usage: &[UsageRecord]) -> Vec<CategoryUsage> {
    let mut totals: HashMap<MedicationCategory, i64> = HashMap::new();
    for row in usage {
        *totals.entry(row.category).or_insert(0) += row.quantity;
    }
    let mut rows: Vec<CategoryUsage> = totals
        .into_iter()
        .map(|(category, total)| CategoryUsage {
            category,
            label: category.label().to_string(),
            total,
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));
    rows
}

pub(crate) fn top_medications(usage: &[UsageRecord], limit: usize) -> Vec<MedicationUsage> {
    let mut grouped: BTreeMap<i64, (MedicationUsage, HashSet<i64>)> = BTreeMap::new();
    for row in usage {
        let entry = grouped.entry(row.medication_id).or_insert_with(|| {
            (
                MedicationUsage {
                    medication_id: row.medication_id,
                    name: row.medication_name.clone(),
                    category: row.category.label().to_string(),
                    branch_name: row.branch_name.clone(),
                    total: 0,
                    patients: 0,
                },
                HashSet::new(),
            )
        });
        entry.0.total += row.quantity;
        entry.1.insert(row.patient_id);
    }
    let mut rows: Vec<MedicationUsage> = grouped
        .into_values()
        .map(|(mut usage, patients)| {
            usage.patients = patients.len();
            usage
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    rows.truncate(limit);
    rows
}

impl AnalyticsService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            appointments: AppointmentRepository::new(pool.clone()),
            branches: BranchRepository::new(pool.clone()),
            medications: MedicationRepository::new(pool.clone()),
            owners: OwnerRepository::new(pool.clone()),
            usage: UsageRepository::new(pool.clone()),
            users: UserRepository::new(pool),
        }
    }

    fn vet_output(&self, scope: BranchScope, appointments: &[Appointment]) -> Result<Vec<VetOutput>, ServiceError> {
        let units: HashMap<i64, i64> = self
            .usage
            .list(&UsageFilter {
                scope,
                ..UsageFilter::default()
            })?
            .into_iter()
            .filter(|row| row.appointment_status == AppointmentStatus::Attended)
            .filter_map(|row| row.vet_id.map(|vet| (vet, row.quantity)))
            .fold(HashMap::new(), |mut acc, (vet, quantity)| {
                *acc.entry(vet).or_insert(0) += quantity;
                acc
            });
        let vets: HashMap<i64, User> = self
            .users
            .list_vets(BranchScope::All, false)?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();

        let mut grouped: HashMap<i64, (usize, HashSet<i64>)> = HashMap::new();
        for appointment in appointments.iter().filter(|a| a.status == AppointmentStatus::Attended) {
            if let Some(vet) = appointment.vet_id {
                let entry = grouped.entry(vet).or_default();
                entry.0 += 1;
                entry.1.insert(appointment.patient_id);
            }
        }

        let mut rows: Vec<VetOutput> = grouped
            .into_iter()
            .map(|(vet_id, (attended, patients))| {
                let vet = vets.get(&vet_id);
                VetOutput {
                    vet_id,
                    name: vet.map(User::display_name).unwrap_or_default(),
                    branch_name: vet.and_then(|v| v.branch_name.clone()).unwrap_or_default(),
                    attended,
                    patients: patients.len(),
                    units_dispensed: units.get(&vet_id).copied().unwrap_or(0),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.attended.cmp(&a.attended).then_with(|| a.name.cmp(&b.name)));
        rows.truncate(6);
        Ok(rows)
    }

    fn medication_options(&self, selection: &BranchSelection) -> Result<Vec<Medication>, ServiceError> {
        let mut medications = Vec::new();
        for branch in &selection.branches {
            if selection.selected.as_ref().map_or(true, |s| s.id == branch.id) {
                medications.extend(self.medications.list_by_branch(branch.id)?);
            }
        }
        medications.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        medications.truncate(150);
        Ok(medications)
    }
}

#[async_trait]
impl AnalyticsServiceTrait for AnalyticsService {
    async fn vet_team(&self, actor: &Actor) -> Result<VetTeamReport, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let scope = actor.scope();
        let now = now_utc();
        let vets = self.users.list_vets(scope, false)?;
        let appointments = self.appointments.list(&AppointmentFilter::scoped(scope))?;
        let all: Vec<&Appointment> = appointments.iter().collect();

        let scheduled = count_status(&all, AppointmentStatus::Scheduled);
        let attended = count_status(&all, AppointmentStatus::Attended);
        let pending = count_status(&all, AppointmentStatus::Pending);
        let mut week: Vec<Appointment> = appointments.iter().filter(|a| in_week(a, now)).cloned().collect();
        week.sort_by_key(|a| a.scheduled_at);
        let today = now.date_naive();

        let summary = TeamSummary {
            vets: vets.len(),
            pending,
            scheduled,
            attended,
            cancelled: count_status(&all, AppointmentStatus::Cancelled),
            in_progress: pending + scheduled,
            fulfilment_rate: percent(attended, scheduled + attended),
            this_week: week.len(),
            today: appointments
                .iter()
                .filter(|a| {
                    a.status == AppointmentStatus::Scheduled
                        && a.scheduled_at.map(|at| at.date_naive()) == Some(today)
                })
                .count(),
            without_time: appointments
                .iter()
                .filter(|a| a.status == AppointmentStatus::Scheduled && a.scheduled_at.is_none())
                .count(),
            week_percentage: percent(week.len(), scheduled).min(100),
        };

        let mut recent_requests: Vec<Appointment> = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Pending)
            .cloned()
            .collect();
        recent_requests.sort_by_key(|a| a.requested_date);
        recent_requests.truncate(5);

        let mut workloads: Vec<VetWorkload> = vets.iter().map(|vet| vet_workload(vet, &appointments, now)).collect();
        let max_load = workloads.iter().map(|w| w.in_progress).max().unwrap_or(0);
        for workload in &mut workloads {
            workload.load_percentage = percent(workload.in_progress, max_load);
        }

        week.truncate(6);
        Ok(VetTeamReport {
            summary,
            next_slots: week,
            recent_requests,
            vets: workloads,
        })
    }

    async fn indicators(&self, actor: &Actor) -> Result<Indicators, ServiceError> {
        actor.require_any(&[Role::Admin, Role::AdminOp, Role::Vet])?;
        let now = now_utc();
        let today = now.date_naive();
        let period_start = today - Duration::days(29);
        let all = self.appointments.list(&AppointmentFilter::scoped(actor.scope()))?;
        let period: Vec<Appointment> = all.iter().filter(|a| a.requested_date >= period_start).cloned().collect();
        debug!("Indicators over {} appointments since {}", period.len(), period_start);

        let stats = AppointmentStats::from_appointments(&period);
        let confirmation_days: Vec<i64> = period
            .iter()
            .filter_map(|a| a.scheduled_at.map(|at| (at.date_naive() - a.requested_date).num_days()))
            .filter(|days| *days >= 0)
            .collect();
        let average_confirmation_days = if confirmation_days.is_empty() {
            0.0
        } else {
            let sum: i64 = confirmation_days.iter().sum();
            (sum as f64 / confirmation_days.len() as f64 * 10.0).round() / 10.0
        };

        let mut kinds: Vec<KindCount> = AppointmentKind::ALL
            .iter()
            .map(|kind| KindCount {
                kind: *kind,
                label: kind.label().to_string(),
                total: period.iter().filter(|a| a.kind == *kind).count(),
            })
            .filter(|k| k.total > 0)
            .collect();
        kinds.sort_by(|a, b| b.total.cmp(&a.total));
        kinds.truncate(5);

        let mut performance: BTreeMap<i64, VetPerformance> = BTreeMap::new();
        for appointment in &period {
            let (Some(vet_id), Some(name)) = (appointment.vet_id, appointment.vet_name.as_ref()) else {
                continue;
            };
            let entry = performance.entry(vet_id).or_insert_with(|| VetPerformance {
                vet_id,
                name: name.clone(),
                total: 0,
                attended: 0,
                scheduled: 0,
                pending: 0,
            });
            entry.total += 1;
            match appointment.status {
                AppointmentStatus::Attended => entry.attended += 1,
                AppointmentStatus::Scheduled => entry.scheduled += 1,
                AppointmentStatus::Pending => entry.pending += 1,
                AppointmentStatus::Cancelled => {}
            }
        }
        let mut vet_performance: Vec<VetPerformance> = performance.into_values().collect();
        vet_performance.sort_by(|a, b| b.attended.cmp(&a.attended).then_with(|| b.total.cmp(&a.total)));
        vet_performance.truncate(6);

        let mut owners: BTreeMap<i64, OwnerCount> = BTreeMap::new();
        for appointment in &period {
            owners
                .entry(appointment.owner_id)
                .or_insert_with(|| OwnerCount {
                    owner_id: appointment.owner_id,
                    name: appointment.owner_name.clone(),
                    total: 0,
                })
                .total += 1;
        }
        let mut top_owners: Vec<OwnerCount> = owners.into_values().collect();
        top_owners.sort_by(|a, b| b.total.cmp(&a.total));
        top_owners.truncate(5);

        let week_end = today + Duration::days(6);
        let mut week_agenda: Vec<Appointment> = all
            .iter()
            .filter(|a| {
                a.status == AppointmentStatus::Scheduled
                    && a.scheduled_at
                        .map_or(false, |at| at.date_naive() >= today && at.date_naive() <= week_end)
            })
            .cloned()
            .collect();
        week_agenda.sort_by_key(|a| a.scheduled_at);
        week_agenda.truncate(6);

        let branch_id = if actor.is_superuser || !actor.role.is_branch_role() {
            None
        } else {
            actor.branch_id
        };
        Ok(Indicators {
            branch_id,
            summary: IndicatorSummary {
                period_start,
                period_end: today,
                resolution_rate: rate(stats.attended, stats.total),
                confirmation_rate: rate(stats.attended, stats.scheduled + stats.attended),
                cancellation_rate: rate(stats.cancelled, stats.total),
                average_confirmation_days,
                stats: stats.clone(),
            },
            daily: daily_series(&all, today),
            top_kinds: kinds,
            vet_performance,
            top_owners,
            week_agenda,
            unassigned: stats.unassigned,
        })
    }

    async fn admin_analytics(&self, actor: &Actor, query: AnalyticsQuery) -> Result<AdminAnalytics, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let selection = select_branch(actor, &self.branches, query.branch.as_deref())?;
        let now = now_utc();
        let usage_period = UsagePeriod::parse(query.usage_period.as_deref());

        let usage = self.usage.list(&UsageFilter {
            scope: selection.scope,
            since: Some(now - Duration::days(usage_period.days())),
            owner_id: None,
        })?;
        let appointments = self.appointments.list(&AppointmentFilter::scoped(selection.scope))?;

        let owners = match selection.scope {
            BranchScope::Nothing => Vec::new(),
            _ => self.owners.activity(&OwnerActivityFilter {
                search: query.owner_q.clone().filter(|q| !q.trim().is_empty()),
                records_since: record_period_start(query.record_period.as_deref(), now.date_naive()),
                medication_id: query.medication_id,
                branch_id: selection.selected.as_ref().map(|b| b.id),
                limit: 25,
            })?,
        };

        Ok(AdminAnalytics {
            all_branches: actor.is_superuser && selection.branches.len() > 1 && selection.selected.is_none(),
            usage_period_label: usage_period.label().to_string(),
            usage_period,
            units_dispensed: usage.iter().map(|row| row.quantity).sum(),
            owners_in_period: usage.iter().map(|row| row.owner_id).collect::<HashSet<_>>().len(),
            vets_in_period: usage.iter().filter_map(|row| row.vet_id).collect::<HashSet<_>>().len(),
            usage_by_category: usage_by_category(&usage),
            top_medications: top_medications(&usage, 8),
            vet_output: self.vet_output(selection.scope, &appointments)?,
            owners,
            medications: self.medication_options(&selection)?,
            branch: selection.selected,
            branches: selection.branches,
        })
    }
}

pub fn create_default_analytics_service(pool: DatabasePool) -> Arc<dyn AnalyticsServiceTrait> {
    Arc::new(AnalyticsService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, add_user, superuser, Fixture};
    use vet_clinic_data::models::{MedicationInput, NewAppointment, RecordInput};
    use vet_clinic_data::repository::{VisitCompletion, VisitRepository};

    fn appointment(fixture: &Fixture, status: AppointmentStatus, at: Option<DateTime<Utc>>, vet: bool) -> Appointment {
        AppointmentRepository::new(fixture.pool.clone())
            .create(&NewAppointment {
                patient_id: fixture.patient_id,
                branch_id: fixture.branch_id,
                vet_id: vet.then_some(fixture.vet_id),
                requested_date: at.map_or_else(|| Utc::now().date_naive(), |at| at.date_naive()),
                scheduled_at: at,
                kind: AppointmentKind::Consultation,
                status,
                notes: String::new(),
            })
            .unwrap()
    }

    #[test]
    fn test_rates() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(5, 0), 0);
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(2, 3), 66.7);
        assert_eq!(rate(0, 0), 0.0);
    }

    #[tokio::test]
    async fn test_vet_team_workload() {
        let fixture = Fixture::new();
        let service = AnalyticsService::new(fixture.pool.clone());
        let now = now_utc();
        appointment(&fixture, AppointmentStatus::Scheduled, Some(now + Duration::days(2)), true);
        appointment(&fixture, AppointmentStatus::Scheduled, Some(now + Duration::days(20)), true);
        appointment(&fixture, AppointmentStatus::Attended, Some(now - Duration::days(1)), true);
        appointment(&fixture, AppointmentStatus::Pending, None, false);

        let report = service.vet_team(&superuser()).await.unwrap();
        assert_eq!(report.summary.vets, 1);
        assert_eq!(report.summary.scheduled, 2);
        assert_eq!(report.summary.in_progress, 3);
        assert_eq!(report.summary.fulfilment_rate, 33);
        assert_eq!(report.summary.this_week, 1);
        assert_eq!(report.summary.week_percentage, 50);
        assert_eq!(report.next_slots.len(), 1);
        assert_eq!(report.recent_requests.len(), 1);

        let laura = &report.vets[0];
        assert_eq!(laura.initials, "LR");
        assert_eq!(laura.in_progress, 2);
        assert_eq!(laura.load_percentage, 100);
        assert_eq!(laura.upcoming.len(), 2);

        let vet = actor_for(&fixture.pool, fixture.vet_id);
        assert!(matches!(service.vet_team(&vet).await, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_indicators_rates_and_series() {
        let fixture = Fixture::new();
        let service = AnalyticsService::new(fixture.pool.clone());
        let now = now_utc();
        appointment(&fixture, AppointmentStatus::Attended, Some(now), true);
        appointment(&fixture, AppointmentStatus::Cancelled, Some(now), true);
        appointment(&fixture, AppointmentStatus::Pending, None, false);

        let indicators = service.indicators(&actor_for(&fixture.pool, fixture.vet_id)).await.unwrap();
        assert_eq!(indicators.branch_id, Some(fixture.branch_id));
        assert_eq!(indicators.summary.stats.total, 3);
        assert_eq!(indicators.summary.resolution_rate, 33.3);
        assert_eq!(indicators.summary.confirmation_rate, 100.0);
        assert_eq!(indicators.summary.cancellation_rate, 33.3);
        assert_eq!(indicators.summary.average_confirmation_days, 0.0);
        assert_eq!(indicators.daily.len(), 7);
        let today = indicators.daily.last().unwrap();
        assert_eq!(today.requested, 3);
        assert_eq!(today.attended, 1);
        assert_eq!(today.cancelled, 1);
        assert_eq!(indicators.top_kinds[0].total, 3);
        assert_eq!(indicators.unassigned, 1);
        assert_eq!(indicators.top_owners[0].total, 3);

        let owner = actor_for(&fixture.pool, fixture.owner_user_id);
        assert!(matches!(service.indicators(&owner).await, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_admin_analytics_usage() {
        let fixture = Fixture::new();
        let service = AnalyticsService::new(fixture.pool.clone());
        let meloxicam = MedicationRepository::new(fixture.pool.clone())
            .create(&MedicationInput {
                branch_id: fixture.branch_id,
                name: "Meloxicam".to_string(),
                category: MedicationCategory::AnalgesicsAntiInflammatories,
                description: String::new(),
                stock: 20,
            })
            .unwrap();
        let visit = appointment(&fixture, AppointmentStatus::Scheduled, Some(now_utc()), true);
        VisitRepository::new(fixture.pool.clone())
            .complete(&VisitCompletion {
                appointment_id: visit.id,
                vet_id: fixture.vet_id,
                record: RecordInput {
                    diagnosis: "Arthritis".to_string(),
                    ..RecordInput::default()
                },
                medications: Some(vec![(meloxicam.id, 4)]),
            })
            .unwrap();

        let analytics = service.admin_analytics(&superuser(), AnalyticsQuery::default()).await.unwrap();
        assert!(analytics.all_branches);
        assert_eq!(analytics.usage_period, UsagePeriod::Month);
        assert_eq!(analytics.units_dispensed, 4);
        assert_eq!(analytics.owners_in_period, 1);
        assert_eq!(analytics.vets_in_period, 1);
        assert_eq!(analytics.usage_by_category[0].total, 4);
        assert_eq!(analytics.top_medications[0].patients, 1);
        assert_eq!(analytics.vet_output[0].units_dispensed, 4);
        assert_eq!(analytics.owners.len(), 1);
        assert_eq!(analytics.medications.len(), 1);

        let norte = service
            .admin_analytics(
                &superuser(),
                AnalyticsQuery {
                    branch: Some(fixture.other_branch_id.to_string()),
                    ..AnalyticsQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(norte.units_dispensed, 0);
        assert!(norte.owners.is_empty());

        let admin = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.other_branch_id));
        let denied = service
            .admin_analytics(
                &actor_for(&fixture.pool, admin.id),
                AnalyticsQuery {
                    branch: Some(fixture.branch_id.to_string()),
                    ..AnalyticsQuery::default()
                },
            )
            .await;
        assert!(matches!(denied, Err(ServiceError::Forbidden(_))));
    }
}
