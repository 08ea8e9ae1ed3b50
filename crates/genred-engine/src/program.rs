//! Flat evaluation programs.
//!
//! A [`Formula`] is lowered once into a list of instructions over a scratch
//! buffer. Every distinct subexpression gets its own slot range, identical
//! subtrees share one. Evaluating a pair `(i, j)` is then a single pass over
//! the instruction list with no tree walking and no allocation.

use std::collections::HashMap;

use genred_formula::{BinaryOp, Category, Formula, TernaryOp, UnaryOp};

use crate::binding::Binding;
use crate::error::{ReductionError, ReductionResult, ShapeMismatchError};

#[derive(Debug, Clone, PartialEq)]
enum Instr {
    Load {
        position: usize,
        category: Category,
        out: usize,
        dim: usize,
    },
    Const {
        value: f64,
        out: usize,
    },
    Zero {
        out: usize,
        dim: usize,
    },
    Unary {
        op: UnaryOp,
        arg: usize,
        arg_dim: usize,
        out: usize,
        dim: usize,
    },
    Binary {
        op: BinaryOp,
        lhs: usize,
        lhs_dim: usize,
        rhs: usize,
        rhs_dim: usize,
        out: usize,
        dim: usize,
    },
    IfElse {
        cond: usize,
        cond_dim: usize,
        then: usize,
        otherwise: usize,
        out: usize,
        dim: usize,
    },
}

/// A compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    instrs: Vec<Instr>,
    scratch_len: usize,
    output: usize,
    dim: usize,
    loads: Vec<(usize, Category, usize)>,
}

struct Compiler {
    instrs: Vec<Instr>,
    next_slot: usize,
    seen: HashMap<String, usize>,
    loads: Vec<(usize, Category, usize)>,
}

impl Compiler {
    fn alloc(&mut self, dim: usize) -> usize {
        let out = self.next_slot;
        self.next_slot += dim;
        out
    }

    fn lower(&mut self, f: &Formula) -> usize {
        let key = f.signature();
        if let Some(&slot) = self.seen.get(&key) {
            return slot;
        }
        let dim = f.dim();
        let instr = match f {
            Formula::Var(v) => {
                if !self.loads.iter().any(|(p, _, _)| *p == v.position) {
                    self.loads.push((v.position, v.category, v.dim));
                }
                Instr::Load {
                    position: v.position,
                    category: v.category,
                    out: self.alloc(dim),
                    dim,
                }
            }
            Formula::Const(value) => Instr::Const {
                value: *value,
                out: self.alloc(1),
            },
            Formula::Zero(d) => Instr::Zero {
                out: self.alloc(*d),
                dim: *d,
            },
            Formula::Unary { op, arg, .. } => {
                let a = self.lower(arg);
                Instr::Unary {
                    op: *op,
                    arg: a,
                    arg_dim: arg.dim(),
                    out: self.alloc(dim),
                    dim,
                }
            }
            Formula::Binary { op, lhs, rhs, .. } => {
                let l = self.lower(lhs);
                let r = self.lower(rhs);
                Instr::Binary {
                    op: *op,
                    lhs: l,
                    lhs_dim: lhs.dim(),
                    rhs: r,
                    rhs_dim: rhs.dim(),
                    out: self.alloc(dim),
                    dim,
                }
            }
            Formula::Ternary { op, args, .. } => match op {
                TernaryOp::IfElse => {
                    let c = self.lower(&args[0]);
                    let a = self.lower(&args[1]);
                    let b = self.lower(&args[2]);
                    Instr::IfElse {
                        cond: c,
                        cond_dim: args[0].dim(),
                        then: a,
                        otherwise: b,
                        out: self.alloc(dim),
                        dim,
                    }
                }
            },
        };
        let out = instr_out(&instr);
        self.instrs.push(instr);
        self.seen.insert(key, out);
        out
    }
}

fn instr_out(instr: &Instr) -> usize {
    match instr {
        Instr::Load { out, .. }
        | Instr::Const { out, .. }
        | Instr::Zero { out, .. }
        | Instr::Unary { out, .. }
        | Instr::Binary { out, .. }
        | Instr::IfElse { out, .. } => *out,
    }
}

#[inline]
fn at(scratch: &[f64], base: usize, dim: usize, k: usize) -> f64 {
    if dim == 1 {
        scratch[base]
    } else {
        scratch[base + k]
    }
}

impl Program {
    pub fn compile(formula: &Formula) -> Self {
        let mut compiler = Compiler {
            instrs: Vec::new(),
            next_slot: 0,
            seen: HashMap::new(),
            loads: Vec::new(),
        };
        let output = compiler.lower(formula);
        Self {
            instrs: compiler.instrs,
            scratch_len: compiler.next_slot,
            output,
            dim: formula.dim(),
            loads: compiler.loads,
        }
    }

    /// Output dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn scratch_len(&self) -> usize {
        self.scratch_len
    }

    pub fn new_scratch(&self) -> Vec<f64> {
        vec![0.0; self.scratch_len]
    }

    /// Whether the program reads any argument indexed by `category`.
    pub fn reads(&self, category: Category) -> bool {
        self.loads.iter().any(|(_, c, _)| *c == category)
    }

    /// Check that every variable read by the program is bound with the same
    /// category and dimension.
    pub fn check(&self, binding: &Binding) -> ReductionResult<()> {
        for &(position, category, dim) in &self.loads {
            match binding.get(position) {
                Some(arg) if arg.var.category == category && arg.var.dim == dim => {}
                Some(arg) => {
                    return Err(ReductionError::ShapeMismatch(
                        ShapeMismatchError::new(
                            arg.var.name.clone(),
                            (None, Some(dim)),
                            (arg.rows(), arg.var.dim),
                        )
                        .with_context(format!(
                            "formula reads position {} as {}({})",
                            position,
                            category.tag(),
                            dim
                        )),
                    ))
                }
                None => {
                    return Err(ReductionError::shape_mismatch(
                        format!("#{}", position),
                        (None, Some(dim)),
                        (0, 0),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Evaluate the formula on the pair `(i, j)`.
    ///
    /// `scratch` must hold at least [`Program::scratch_len`] values.
    pub fn eval<'s>(&self, binding: &Binding, i: usize, j: usize, scratch: &'s mut [f64]) -> &'s [f64] {
        for instr in &self.instrs {
            match *instr {
                Instr::Load {
                    position, out, dim, ..
                } => {
                    scratch[out..out + dim].copy_from_slice(binding.row(position, i, j));
                }
                Instr::Const { value, out } => scratch[out] = value,
                Instr::Zero { out, dim } => scratch[out..out + dim].fill(0.0),
                Instr::Unary {
                    op,
                    arg,
                    arg_dim,
                    out,
                    dim,
                } => eval_unary(op, scratch, arg, arg_dim, out, dim),
                Instr::Binary {
                    op,
                    lhs,
                    lhs_dim,
                    rhs,
                    rhs_dim,
                    out,
                    dim,
                } => eval_binary(op, scratch, (lhs, lhs_dim), (rhs, rhs_dim), out, dim),
                Instr::IfElse {
                    cond,
                    cond_dim,
                    then,
                    otherwise,
                    out,
                    dim,
                } => {
                    for k in 0..dim {
                        scratch[out + k] = if at(scratch, cond, cond_dim, k) >= 0.0 {
                            scratch[then + k]
                        } else {
                            scratch[otherwise + k]
                        };
                    }
                }
            }
        }
        &scratch[self.output..self.output + self.dim]
    }
}

fn eval_unary(op: UnaryOp, s: &mut [f64], arg: usize, arg_dim: usize, out: usize, dim: usize) {
    match op {
        UnaryOp::SqNorm2 => s[out] = s[arg..arg + arg_dim].iter().map(|v| v * v).sum(),
        UnaryOp::Norm2 => s[out] = s[arg..arg + arg_dim].iter().map(|v| v * v).sum::<f64>().sqrt(),
        UnaryOp::Sum => s[out] = s[arg..arg + arg_dim].iter().sum(),
        UnaryOp::Extract { start, len } => s.copy_within(arg + start..arg + start + len, out),
        UnaryOp::ExtractT { start, .. } => {
            s[out..out + dim].fill(0.0);
            s.copy_within(arg..arg + arg_dim, out + start);
        }
        UnaryOp::Broadcast(_) => {
            let v = s[arg];
            s[out..out + dim].fill(v);
        }
        _ => {
            for k in 0..dim {
                s[out + k] = op.apply_scalar(s[arg + k]);
            }
        }
    }
}

fn eval_binary(
    op: BinaryOp,
    s: &mut [f64],
    (lhs, lhs_dim): (usize, usize),
    (rhs, rhs_dim): (usize, usize),
    out: usize,
    dim: usize,
) {
    match op {
        BinaryOp::SqDist => {
            let mut acc = 0.0;
            for k in 0..lhs_dim {
                let d = s[lhs + k] - s[rhs + k];
                acc += d * d;
            }
            s[out] = acc;
        }
        BinaryOp::Scalprod => {
            let mut acc = 0.0;
            for k in 0..lhs_dim {
                acc += s[lhs + k] * s[rhs + k];
            }
            s[out] = acc;
        }
        BinaryOp::Concat => {
            s.copy_within(lhs..lhs + lhs_dim, out);
            s.copy_within(rhs..rhs + rhs_dim, out + lhs_dim);
        }
        _ => {
            for k in 0..dim {
                s[out + k] = op.apply_scalar(at(s, lhs, lhs_dim, k), at(s, rhs, rhs_dim, k));
            }
        }
    }
}
