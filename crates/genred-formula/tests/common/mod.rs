//! Reference pointwise evaluator used to check symbolic results numerically.

#![allow(dead_code)]

use std::collections::HashMap;

use genred_formula::{BinaryOp, Formula, TernaryOp, UnaryOp, Variable};

pub type Env = HashMap<usize, Vec<f64>>;

fn broadcast(v: &[f64], dim: usize) -> Vec<f64> {
    if v.len() == dim {
        v.to_vec()
    } else {
        vec![v[0]; dim]
    }
}

pub fn eval(f: &Formula, env: &Env) -> Vec<f64> {
    match f {
        Formula::Var(v) => env[&v.position].clone(),
        Formula::Const(c) => vec![*c],
        Formula::Zero(d) => vec![0.0; *d],
        Formula::Unary { op, arg, .. } => {
            let a = eval(arg, env);
            match *op {
                UnaryOp::SqNorm2 => vec![a.iter().map(|x| x * x).sum()],
                UnaryOp::Norm2 => vec![a.iter().map(|x| x * x).sum::<f64>().sqrt()],
                UnaryOp::Sum => vec![a.iter().sum()],
                UnaryOp::Extract { start, len } => a[start..start + len].to_vec(),
                UnaryOp::ExtractT { start, dim } => {
                    let mut out = vec![0.0; dim];
                    out[start..start + a.len()].copy_from_slice(&a);
                    out
                }
                UnaryOp::Broadcast(dim) => vec![a[0]; dim],
                _ => a.iter().map(|&x| op.apply_scalar(x)).collect(),
            }
        }
        Formula::Binary { op, lhs, rhs, dim } => {
            let a = eval(lhs, env);
            let b = eval(rhs, env);
            match op {
                BinaryOp::SqDist => vec![a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum()],
                BinaryOp::Scalprod => vec![a.iter().zip(&b).map(|(x, y)| x * y).sum()],
                BinaryOp::Concat => a.into_iter().chain(b).collect(),
                _ => {
                    let a = broadcast(&a, *dim);
                    let b = broadcast(&b, *dim);
                    a.iter().zip(&b).map(|(&x, &y)| op.apply_scalar(x, y)).collect()
                }
            }
        }
        Formula::Ternary { op, args, dim } => match op {
            TernaryOp::IfElse => {
                let c = broadcast(&eval(&args[0], env), *dim);
                let a = eval(&args[1], env);
                let b = eval(&args[2], env);
                (0..*dim)
                    .map(|k| if c[k] >= 0.0 { a[k] } else { b[k] })
                    .collect()
            }
        },
    }
}

/// Central finite-difference vector-Jacobian product of `f` at `env`.
pub fn numeric_vjp(f: &Formula, wrt: &Variable, e: &[f64], env: &Env, h: f64) -> Vec<f64> {
    (0..wrt.dim)
        .map(|k| {
            let mut plus = env.clone();
            let mut minus = env.clone();
            plus.get_mut(&wrt.position).unwrap()[k] += h;
            minus.get_mut(&wrt.position).unwrap()[k] -= h;
            let fp = eval(f, &plus);
            let fm = eval(f, &minus);
            fp.iter()
                .zip(&fm)
                .zip(e)
                .map(|((p, m), w)| w * (p - m) / (2.0 * h))
                .sum()
        })
        .collect()
}
