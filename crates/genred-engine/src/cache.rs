//! Compiled plan cache.
//!
//! Compiling a formula pair into evaluation programs is cached per
//! `(signature, precision, device)`. The cache is an explicit object owned by
//! a [`crate::ReductionEngine`] and shared behind `Arc`. Reads take a shared
//! lock; a miss compiles outside the lock and the first insert for a key wins,
//! so concurrent callers always end up with the same plan.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use genred_formula::Formula;
use tracing::debug;

use crate::binding::Binding;
use crate::device::Device;
use crate::error::ReductionResult;
use crate::program::Program;
use crate::tensor::Precision;

/// Evaluation programs of a formula and its optional weight formula.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    pub signature: String,
    pub program: Program,
    /// Program of `formula2`, read by SoftMax
    pub weights: Option<Program>,
}

impl CompiledPlan {
    pub fn compile(formula: &Formula, formula2: Option<&Formula>) -> Self {
        Self {
            signature: plan_signature(formula, formula2),
            program: Program::compile(formula),
            weights: formula2.map(Program::compile),
        }
    }

    /// Dimension of one output row.
    pub fn output_dim(&self) -> usize {
        self.weights
            .as_ref()
            .map_or(self.program.dim(), |w| w.dim())
    }

    pub fn check(&self, binding: &Binding) -> ReductionResult<()> {
        self.program.check(binding)?;
        if let Some(w) = &self.weights {
            w.check(binding)?;
        }
        Ok(())
    }
}

fn plan_signature(formula: &Formula, formula2: Option<&Formula>) -> String {
    match formula2 {
        Some(f2) => format!("{};{}", formula.signature(), f2.signature()),
        None => formula.signature(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub signature: String,
    pub precision: Precision,
    pub device: Device,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Plan cache: {} entries, {} hits ({:.1}%), {} misses",
            self.entries,
            self.hits,
            self.hit_rate() * 100.0,
            self.misses
        )
    }
}

#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<PlanKey, Arc<CompiledPlan>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the plan for a formula pair, compiling it on a miss.
    pub fn get_or_compile(
        &self,
        formula: &Formula,
        formula2: Option<&Formula>,
        precision: Precision,
        device: Device,
    ) -> Arc<CompiledPlan> {
        let key = PlanKey {
            signature: plan_signature(formula, formula2),
            precision,
            device,
        };

        {
            let plans = self.plans.read().unwrap_or_else(|e| e.into_inner());
            if let Some(plan) = plans.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Arc::clone(plan);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(signature = %key.signature, precision = %precision, "compiling plan");
        let compiled = Arc::new(CompiledPlan::compile(formula, formula2));
        let mut plans = self.plans.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(plans.entry(key).or_insert(compiled))
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.plans.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
