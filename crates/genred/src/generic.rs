//! Sum reductions with the legacy call signature.
//!
//! The signature lists `(dim, category)` pairs, output first and then one
//! entry per argument position, with categories coded `0 = i`, `1 = j`,
//! `2 = parameter`. `sum_index` 0 sums over `j` and 1 over `i`.

use genred_engine::{
    ArgTensor, Axis, BackendMode, ReductionDescriptor, ReductionEngine, ReductionError,
    ReductionOp, ReductionResult,
};
use genred_formula::{parse, AliasTable, Category, FormulaError};

/// Check a legacy signature against the alias table and the formula's
/// output dimension.
pub fn check_signature(
    aliases: &AliasTable,
    output_dim: usize,
    signature: &[(usize, u8)],
    axis: Axis,
) -> ReductionResult<()> {
    let Some((&(out_dim, out_cat), args)) = signature.split_first() else {
        return Err(ReductionError::dimension(
            "GenericSum",
            "signature must start with the output",
        ));
    };
    if out_dim != output_dim || Category::from_code(out_cat) != Some(axis.surviving()) {
        return Err(ReductionError::dimension(
            "GenericSum",
            format!(
                "signature output ({}, {}) does not match formula output ({}, {})",
                out_dim,
                out_cat,
                output_dim,
                axis.surviving().code()
            ),
        ));
    }
    if args.len() != aliases.len() {
        return Err(ReductionError::dimension(
            "GenericSum",
            format!(
                "signature lists {} arguments, aliases declare {}",
                args.len(),
                aliases.len()
            ),
        ));
    }
    for (position, &(dim, code)) in args.iter().enumerate() {
        let var = aliases.by_position(position).ok_or_else(|| {
            ReductionError::dimension("GenericSum", format!("no alias at position {}", position))
        })?;
        if var.dim != dim || var.category.code() != code {
            return Err(FormulaError::invalid_alias(
                var.to_string(),
                format!("signature declares ({}, {})", dim, code),
            )
            .into());
        }
    }
    Ok(())
}

/// Sum reduction of `formula` with the legacy signature.
pub fn generic_sum<S: AsRef<str>>(
    backend: &str,
    aliases: &[S],
    formula: &str,
    signature: &[(usize, u8)],
    sum_index: u8,
    args: &[ArgTensor],
) -> ReductionResult<ArgTensor> {
    let backend: BackendMode = backend.parse()?;
    let axis = Axis::from_sum_index(sum_index)?;
    let aliases = AliasTable::parse(aliases)?;
    let formula = parse(formula, &aliases)?;
    check_signature(&aliases, formula.dim(), signature, axis)?;

    ReductionEngine::default().reduce_args(
        &formula,
        None,
        ReductionDescriptor::new(ReductionOp::Sum, axis),
        Some(backend),
        &aliases,
        args,
    )
}
