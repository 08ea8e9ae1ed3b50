//! Per-row accumulators.
//!
//! One accumulator collects the values of a single output row over a
//! contiguous, ascending range of the reduced index. Partial accumulators of
//! consecutive ranges are combined with [`RowAccumulator::merge`], always
//! left (lower indices) to right, which keeps the result independent of how
//! the range was split across workers as long as the split is fixed.

use crate::reduction::ReductionOp;

#[derive(Debug, Clone, PartialEq)]
pub enum RowAccumulator {
    Sum(Vec<f64>),
    Max(Vec<f64>),
    Min(Vec<f64>),
    ArgMax { best: f64, index: Option<usize> },
    ArgMin { best: f64, index: Option<usize> },
    /// Online log-sum-exp: `max + ln(sum)`
    LogSumExp { max: f64, sum: f64 },
    /// Online softmax with running-max rescaling
    SoftMax { max: f64, denom: f64, num: Vec<f64> },
}

impl RowAccumulator {
    /// Empty accumulator for an output row of dimension `dim`.
    pub fn new(op: ReductionOp, dim: usize) -> Self {
        match op {
            ReductionOp::Sum => RowAccumulator::Sum(vec![0.0; dim]),
            ReductionOp::Max => RowAccumulator::Max(vec![f64::NEG_INFINITY; dim]),
            ReductionOp::Min => RowAccumulator::Min(vec![f64::INFINITY; dim]),
            ReductionOp::ArgMax => RowAccumulator::ArgMax {
                best: f64::NEG_INFINITY,
                index: None,
            },
            ReductionOp::ArgMin => RowAccumulator::ArgMin {
                best: f64::INFINITY,
                index: None,
            },
            ReductionOp::LogSumExp => RowAccumulator::LogSumExp {
                max: f64::NEG_INFINITY,
                sum: 0.0,
            },
            ReductionOp::SoftMax => RowAccumulator::SoftMax {
                max: f64::NEG_INFINITY,
                denom: 0.0,
                num: vec![0.0; dim],
            },
        }
    }

    /// Fold in the value at reduced index `j`. `weight` is the formula2
    /// value and is only read by SoftMax.
    #[inline]
    pub fn push(&mut self, j: usize, value: &[f64], weight: &[f64]) {
        match self {
            RowAccumulator::Sum(acc) => {
                for (a, v) in acc.iter_mut().zip(value) {
                    *a += v;
                }
            }
            RowAccumulator::Max(acc) => {
                for (a, &v) in acc.iter_mut().zip(value) {
                    if v > *a {
                        *a = v;
                    }
                }
            }
            RowAccumulator::Min(acc) => {
                for (a, &v) in acc.iter_mut().zip(value) {
                    if v < *a {
                        *a = v;
                    }
                }
            }
            RowAccumulator::ArgMax { best, index } => {
                if index.is_none() || value[0] > *best {
                    *best = value[0];
                    *index = Some(j);
                }
            }
            RowAccumulator::ArgMin { best, index } => {
                if index.is_none() || value[0] < *best {
                    *best = value[0];
                    *index = Some(j);
                }
            }
            RowAccumulator::LogSumExp { max, sum } => {
                let v = value[0];
                if v == f64::NEG_INFINITY {
                    return;
                }
                if v > *max {
                    *sum = *sum * shifted_exp(*max, v) + 1.0;
                    *max = v;
                } else {
                    *sum += shifted_exp(v, *max);
                }
            }
            RowAccumulator::SoftMax { max, denom, num } => {
                let v = value[0];
                if v == f64::NEG_INFINITY {
                    return;
                }
                if v > *max {
                    let scale = shifted_exp(*max, v);
                    *denom = *denom * scale + 1.0;
                    for (n, w) in num.iter_mut().zip(weight) {
                        *n = *n * scale + w;
                    }
                    *max = v;
                } else {
                    let e = shifted_exp(v, *max);
                    *denom += e;
                    for (n, w) in num.iter_mut().zip(weight) {
                        *n += e * w;
                    }
                }
            }
        }
    }

    /// Combine with the accumulator of the range that follows this one.
    pub fn merge(&mut self, next: &RowAccumulator) {
        match (self, next) {
            (RowAccumulator::Sum(a), RowAccumulator::Sum(b)) => {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
            }
            (RowAccumulator::Max(a), RowAccumulator::Max(b)) => {
                for (x, &y) in a.iter_mut().zip(b) {
                    if y > *x {
                        *x = y;
                    }
                }
            }
            (RowAccumulator::Min(a), RowAccumulator::Min(b)) => {
                for (x, &y) in a.iter_mut().zip(b) {
                    if y < *x {
                        *x = y;
                    }
                }
            }
            (
                RowAccumulator::ArgMax { best, index },
                RowAccumulator::ArgMax {
                    best: other,
                    index: other_index,
                },
            ) => {
                if other_index.is_some() && (index.is_none() || *other > *best) {
                    *best = *other;
                    *index = *other_index;
                }
            }
            (
                RowAccumulator::ArgMin { best, index },
                RowAccumulator::ArgMin {
                    best: other,
                    index: other_index,
                },
            ) => {
                if other_index.is_some() && (index.is_none() || *other < *best) {
                    *best = *other;
                    *index = *other_index;
                }
            }
            (
                RowAccumulator::LogSumExp { max, sum },
                RowAccumulator::LogSumExp {
                    max: other_max,
                    sum: other_sum,
                },
            ) => {
                if *other_max == f64::NEG_INFINITY {
                    return;
                }
                if *max == f64::NEG_INFINITY {
                    *max = *other_max;
                    *sum = *other_sum;
                    return;
                }
                let m = max.max(*other_max);
                *sum = *sum * shifted_exp(*max, m) + other_sum * shifted_exp(*other_max, m);
                *max = m;
            }
            (
                RowAccumulator::SoftMax { max, denom, num },
                RowAccumulator::SoftMax {
                    max: other_max,
                    denom: other_denom,
                    num: other_num,
                },
            ) => {
                if *other_max == f64::NEG_INFINITY {
                    return;
                }
                if *max == f64::NEG_INFINITY {
                    *max = *other_max;
                    *denom = *other_denom;
                    num.copy_from_slice(other_num);
                    return;
                }
                let m = max.max(*other_max);
                let s = shifted_exp(*max, m);
                let t = shifted_exp(*other_max, m);
                *denom = *denom * s + other_denom * t;
                for (x, y) in num.iter_mut().zip(other_num) {
                    *x = *x * s + y * t;
                }
                *max = m;
            }
            // Accumulators of one reduction always share a variant.
            _ => {}
        }
    }

    /// Write the reduced row.
    pub fn finish(&self, out: &mut [f64]) {
        match self {
            RowAccumulator::Sum(a) | RowAccumulator::Max(a) | RowAccumulator::Min(a) => {
                out.copy_from_slice(a)
            }
            RowAccumulator::ArgMax { index, .. } | RowAccumulator::ArgMin { index, .. } => {
                out[0] = index.map_or(f64::NAN, |j| j as f64);
            }
            RowAccumulator::LogSumExp { max, sum } => {
                out[0] = if *sum == 0.0 {
                    f64::NEG_INFINITY
                } else {
                    max + sum.ln()
                };
            }
            RowAccumulator::SoftMax { denom, num, .. } => {
                for (o, n) in out.iter_mut().zip(num) {
                    *o = if *denom == 0.0 { f64::NAN } else { n / denom };
                }
            }
        }
    }
}

/// `exp(v - max)`, with equal arguments weighing 1 so that `+inf` logits
/// dominate instead of producing NaN.
#[inline]
pub(crate) fn shifted_exp(v: f64, max: f64) -> f64 {
    if v == max {
        1.0
    } else {
        (v - max).exp()
    }
}
