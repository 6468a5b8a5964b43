//! Store-backed operations on the module collection.
//!
//! Every mutation is load, compute, save; subscribers on the [`ChangeBus`]
//! hear about it only after the save succeeded.

use rand::Rng;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::events::ChangeBus;
use crate::models::{LearningModule, ReviewStage, Stats, DEFAULT_EXERCISES_TOTAL};
use crate::orchestrator::{self, ApplyOutcome, ModuleUpdateCall};
use crate::resolve::{self, AmbiguityPolicy, Resolution};
use crate::schedule::{self, ProgressUpdate};
use crate::store::ModuleStore;
use chrono::{DateTime, Utc};

pub struct LearningHub<S: ModuleStore> {
    store: S,
    clock: Box<dyn Clock>,
    bus: ChangeBus,
    policy: AmbiguityPolicy,
}

fn locate(modules: &[LearningModule], key: &str) -> Result<usize> {
    let wanted = key.trim().to_lowercase();
    let exact: Vec<usize> = modules
        .iter()
        .enumerate()
        .filter(|(_, m)| m.id == key || m.name.trim().to_lowercase() == wanted)
        .map(|(i, _)| i)
        .collect();
    if let [idx] = exact.as_slice() {
        return Ok(*idx);
    }

    let id = match resolve::resolve(modules, Some(key), key) {
        Resolution::ById(id) | Resolution::ByName(id) => id,
        Resolution::Ambiguous(candidates) => {
            let names: Vec<String> = candidates
                .iter()
                .map(|c| format!("{} ({})", c.name, c.id))
                .collect();
            return Err(Error::InvalidInput(format!(
                "'{}' matches several modules: {}",
                key,
                names.join(", ")
            )));
        }
        Resolution::NotFound => return Err(Error::ModuleNotFound(key.to_string())),
    };

    modules
        .iter()
        .position(|m| m.id == id)
        .ok_or_else(|| Error::ModuleNotFound(key.to_string()))
}

/// Weight for the stochastic pick: overdue and early-stage modules first.
fn pick_weight(module: &LearningModule, now: DateTime<Utc>) -> f64 {
    let overdue = schedule::overdue_days(module, now).max(0) as f64 + 1.0;
    let stage_weight = (ReviewStage::Mastered.as_u8() - module.review_stage.as_u8()) as f64 + 1.0;
    overdue * stage_weight
}

fn pick_weighted<R: Rng>(
    due: &[LearningModule],
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<LearningModule> {
    let weights: Vec<f64> = due.iter().map(|m| pick_weight(m, now)).collect();
    let total: f64 = weights.iter().sum();
    let mut point = rng.gen::<f64>() * total;

    for (i, weight) in weights.iter().enumerate() {
        point -= weight;
        if point <= 0.0 {
            return Some(due[i].clone());
        }
    }

    due.first().cloned()
}

impl<S: ModuleStore> LearningHub<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            bus: ChangeBus::new(),
            policy: AmbiguityPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn commit(&mut self, modules: &[LearningModule]) -> Result<()> {
        self.store.save(modules)?;
        self.bus.notify();
        Ok(())
    }

    /// Loads, changes the one module `key` names, saves.
    fn update_one<F>(&mut self, key: &str, f: F) -> Result<LearningModule>
    where
        F: FnOnce(&LearningModule, DateTime<Utc>) -> LearningModule,
    {
        let mut modules = self.store.load()?;
        let idx = locate(&modules, key)?;
        let now = self.now();
        let updated = f(&modules[idx], now);
        modules[idx] = updated.clone();
        self.commit(&modules)?;
        Ok(updated)
    }

    pub fn modules(&self) -> Result<Vec<LearningModule>> {
        self.store.load()
    }

    /// Looks a module up by exact id or unambiguous name.
    pub fn module(&self, key: &str) -> Result<LearningModule> {
        let modules = self.store.load()?;
        let idx = locate(&modules, key)?;
        Ok(modules[idx].clone())
    }

    pub fn add_module(
        &mut self,
        name: &str,
        description: &str,
        exercises_total: Option<u32>,
    ) -> Result<LearningModule> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("module name cannot be empty".to_string()));
        }

        let mut modules = self.store.load()?;
        let module = LearningModule::new(
            name,
            description.trim(),
            exercises_total.unwrap_or(DEFAULT_EXERCISES_TOTAL),
            self.now(),
        );
        modules.push(module.clone());
        self.commit(&modules)?;

        tracing::info!(id = %module.id, name = %module.name, "module added");
        Ok(module)
    }

    pub fn delete_module(&mut self, key: &str) -> Result<LearningModule> {
        let mut modules = self.store.load()?;
        let idx = locate(&modules, key)?;
        let removed = modules.remove(idx);
        self.commit(&modules)?;

        tracing::info!(id = %removed.id, "module deleted");
        Ok(removed)
    }

    /// Sets or clears the study summary link. Not a study session, so
    /// `last_studied` is left alone.
    pub fn attach_summary(&mut self, key: &str, url: Option<String>) -> Result<LearningModule> {
        let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        self.update_one(key, |m, _| {
            let mut next = m.clone();
            next.pdf_summary_url = url;
            next
        })
    }

    pub fn record_exercise(&mut self, key: &str, update: ProgressUpdate) -> Result<LearningModule> {
        self.update_one(key, |m, now| schedule::record_exercise_progress(m, update, now))
    }

    pub fn complete_review(&mut self, key: &str) -> Result<LearningModule> {
        self.update_one(key, schedule::complete_scheduled_review)
    }

    /// Due modules, most overdue first.
    pub fn due_modules(&self) -> Result<Vec<LearningModule>> {
        let now = self.now();
        let mut due: Vec<LearningModule> = self
            .store
            .load()?
            .into_iter()
            .filter(|m| schedule::is_due(m, now))
            .collect();
        due.sort_by_key(|m| m.next_review_date);
        Ok(due)
    }

    pub fn stats(&self) -> Result<Stats> {
        let modules = self.store.load()?;
        let now = self.now();

        let avg_completion = if modules.is_empty() {
            0.0
        } else {
            modules
                .iter()
                .map(|m| m.completion_percentage as f64)
                .sum::<f64>()
                / modules.len() as f64
        };

        Ok(Stats {
            total_modules: modules.len(),
            in_review: modules.iter().filter(|m| m.review_stage.is_scheduled()).count(),
            mastered: modules
                .iter()
                .filter(|m| m.review_stage == ReviewStage::Mastered)
                .count(),
            due_now: modules.iter().filter(|m| schedule::is_due(m, now)).count(),
            total_reviews: modules.iter().map(|m| m.review_history.len()).sum(),
            avg_completion,
        })
    }

    pub fn next_module(&self) -> Result<Option<LearningModule>> {
        self.next_module_with(&mut rand::thread_rng())
    }

    /// Stochastic pick among due modules; without any, the least complete
    /// module still short of 100%.
    pub fn next_module_with<R: Rng>(&self, rng: &mut R) -> Result<Option<LearningModule>> {
        let due = self.due_modules()?;
        if !due.is_empty() {
            return Ok(pick_weighted(&due, self.now(), rng));
        }

        let unfinished = self
            .store
            .load()?
            .into_iter()
            .filter(|m| m.completion_percentage < 100)
            .min_by_key(|m| (m.completion_percentage, m.last_studied));
        Ok(unfinished)
    }

    /// Applies a model-issued update. Only an `Updated` outcome is saved.
    pub fn apply_tool_call(&mut self, call: &ModuleUpdateCall) -> Result<ApplyOutcome> {
        let mut modules = self.store.load()?;
        let outcome = orchestrator::apply_update(&mut modules, call, self.policy, self.now());

        if let ApplyOutcome::Updated { modules: ref changed } = outcome {
            self.commit(&modules)?;
            tracing::info!(query = %call.module_name, count = changed.len(), "tool call applied");
        }
        Ok(outcome)
    }
}
