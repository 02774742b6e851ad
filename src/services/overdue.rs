use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::database::models::Record;
use crate::database::{DatabaseError, Store};
use crate::resources::schema::OPEN_PLAN_STATUS;
use crate::resources::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdueRun {
    Updated(usize),
    /// Skipped: a run already completed today
    AlreadyRan,
    /// Skipped: another run holds the lock
    Busy,
}

/// Marks overdue action plans as `atrasado`, at most once per day
#[derive(Default)]
pub struct OverdueUpdater {
    running: AtomicBool,
    last_run: Mutex<Option<NaiveDate>>,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OverdueUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    fn ran_on(&self, today: NaiveDate) -> bool {
        *self.last_run.lock().unwrap_or_else(|p| p.into_inner()) == Some(today)
    }

    /// Takes the run lock and repeats the daily check under it
    fn begin(&self, today: NaiveDate, force: bool) -> Result<RunGuard<'_>, OverdueRun> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OverdueRun::Busy);
        }
        let guard = RunGuard(&self.running);
        if !force && self.ran_on(today) {
            return Err(OverdueRun::AlreadyRan);
        }
        Ok(guard)
    }

    /// `force` ignores the once-per-day check but still respects a concurrent run
    pub async fn run_if_needed(
        &self,
        store: &dyn Store,
        today: NaiveDate,
        force: bool,
    ) -> Result<OverdueRun, DatabaseError> {
        if !force && self.ran_on(today) {
            debug!("Overdue update already ran on {}", today);
            return Ok(OverdueRun::AlreadyRan);
        }

        let _guard = match self.begin(today, force) {
            Ok(guard) => guard,
            Err(skipped) => return Ok(skipped),
        };

        let updated = mark_overdue(store, today).await?;
        *self.last_run.lock().unwrap_or_else(|p| p.into_inner()) = Some(today);

        info!("Overdue update marked {} action plan(s) as atrasado", updated);
        Ok(OverdueRun::Updated(updated))
    }
}

/// Open plan whose deadline has passed
pub fn is_overdue(plan: &Record, today: NaiveDate) -> bool {
    let open = plan
        .str_field("status")
        .map_or(true, |s| OPEN_PLAN_STATUS.contains(&s));
    open && plan.date_field("prazo").is_some_and(|prazo| prazo < today)
}

pub async fn mark_overdue(store: &dyn Store, today: NaiveDate) -> Result<usize, DatabaseError> {
    let mut updated = 0;
    for plan in store.list_records(Resource::PlanosAcao).await? {
        if !is_overdue(&plan, today) {
            continue;
        }
        let mut data = plan.data.clone();
        data.insert("status".into(), Value::String("atrasado".into()));
        store.update_record(Resource::PlanosAcao, plan.id, data).await?;
        updated += 1;
    }
    Ok(updated)
}

#[derive(Debug, Serialize)]
pub struct OverdueItem {
    pub id: i64,
    pub risco_id: Option<i64>,
    pub risco_risco_fator: String,
    pub matriz_filial: String,
    pub setor: String,
    pub processo: String,
    pub prazo: String,
    pub dias_atraso: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OverdueReport {
    pub count: usize,
    pub items: Vec<OverdueItem>,
}

/// Open plans past their deadline, with the owning risk's context
pub async fn overdue_report(store: &dyn Store, today: NaiveDate) -> Result<OverdueReport, DatabaseError> {
    let risks: HashMap<i64, Record> = store
        .list_records(Resource::Riscos)
        .await?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();

    let mut plans = store.list_records(Resource::PlanosAcao).await?;
    plans.sort_by_key(|p| (p.date_field("prazo"), p.id));

    let items: Vec<OverdueItem> = plans
        .iter()
        .filter(|p| is_overdue(p, today))
        .filter_map(|plan| {
            let prazo = plan.date_field("prazo")?;
            let risco_id = plan.field("risco").and_then(Value::as_i64);
            let risk = risco_id.and_then(|id| risks.get(&id));
            let risk_str = |field: &str| {
                risk.and_then(|r| r.str_field(field))
                    .unwrap_or_default()
                    .to_string()
            };
            Some(OverdueItem {
                id: plan.id,
                risco_id,
                risco_risco_fator: risk_str("risco_fator"),
                matriz_filial: risk_str("matriz_filial"),
                setor: risk_str("setor"),
                processo: risk_str("processo"),
                prazo: prazo.format("%Y-%m-%d").to_string(),
                dias_atraso: (today - prazo).num_days(),
                status: plan.str_field("status").unwrap_or("nao_iniciado").to_string(),
            })
        })
        .collect();

    Ok(OverdueReport { count: items.len(), items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use serde_json::{json, Map};

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_record(Resource::Riscos, None, obj(json!({"risco_fator": "Vazamento", "setor": "TI"})))
            .await
            .unwrap();
        for (prazo, status) in [
            ("2025-01-10", "nao_iniciado"),
            ("2025-01-10", "concluido"),
            ("2025-03-01", "andamento"),
            ("2025-01-05", "andamento"),
        ] {
            store
                .insert_record(
                    Resource::PlanosAcao,
                    None,
                    obj(json!({"risco": 1, "como": "x", "prazo": prazo, "status": status})),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn report_lists_open_plans_past_deadline() {
        let store = seeded().await;
        let report = overdue_report(&store, day("2025-02-01")).await.unwrap();

        assert_eq!(report.count, 2);
        assert_eq!(report.items[0].id, 4);
        assert_eq!(report.items[0].dias_atraso, 27);
        assert_eq!(report.items[1].risco_risco_fator, "Vazamento");
        assert_eq!(report.items[1].setor, "TI");
    }

    #[tokio::test]
    async fn runs_once_per_day_unless_forced() {
        let store = seeded().await;
        let updater = OverdueUpdater::new();
        let today = day("2025-02-01");

        assert_eq!(updater.run_if_needed(&store, today, false).await.unwrap(), OverdueRun::Updated(2));
        assert_eq!(updater.run_if_needed(&store, today, false).await.unwrap(), OverdueRun::AlreadyRan);
        assert_eq!(updater.run_if_needed(&store, today, true).await.unwrap(), OverdueRun::Updated(0));

        let plan = store.get_record(Resource::PlanosAcao, 1).await.unwrap();
        assert_eq!(plan.str_field("status"), Some("atrasado"));
        let done = store.get_record(Resource::PlanosAcao, 2).await.unwrap();
        assert_eq!(done.str_field("status"), Some("concluido"));
    }

    #[tokio::test]
    async fn concurrent_run_is_skipped() {
        let store = seeded().await;
        let updater = OverdueUpdater::new();
        updater.running.store(true, Ordering::Release);

        let outcome = updater.run_if_needed(&store, day("2025-02-01"), false).await.unwrap();
        assert_eq!(outcome, OverdueRun::Busy);
    }

    #[tokio::test]
    async fn run_finished_while_waiting_for_the_lock_is_not_repeated() {
        let store = seeded().await;
        let updater = OverdueUpdater::new();
        let today = day("2025-02-01");

        // This caller passed the daily check before the first run recorded itself
        assert_eq!(updater.run_if_needed(&store, today, false).await.unwrap(), OverdueRun::Updated(2));
        assert!(matches!(updater.begin(today, false), Err(OverdueRun::AlreadyRan)));
        assert!(!updater.running.load(Ordering::Acquire));

        assert!(updater.begin(today, true).is_ok());
        assert!(!updater.running.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn poisoned_last_run_still_limits_to_once_per_day() {
        let store = seeded().await;
        let updater = std::sync::Arc::new(OverdueUpdater::new());
        let today = day("2025-02-01");

        let held = std::sync::Arc::clone(&updater);
        let _ = std::thread::spawn(move || {
            let _last = held.last_run.lock();
            panic!("poison the lock");
        })
        .join();
        assert!(updater.last_run.is_poisoned());

        assert_eq!(updater.run_if_needed(&store, today, false).await.unwrap(), OverdueRun::Updated(2));
        assert_eq!(updater.run_if_needed(&store, today, false).await.unwrap(), OverdueRun::AlreadyRan);
    }
}
