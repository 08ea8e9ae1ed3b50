//! Variable binding table.
//!
//! Maps every declared formula variable to its positional argument and
//! checks the shape invariants: an argument bound to `Vx` has `M` rows, one
//! bound to `Vy` has `N` rows, a parameter has one row, and the column count
//! always equals the declared dimension.

use scirs2_core::ndarray::Array2;
use std::sync::Arc;

use genred_formula::{AliasTable, Category, Variable};

use crate::error::{ReductionError, ReductionResult, ShapeMismatchError};
use crate::tensor::{ArgTensor, Precision, Residency};

/// One argument bound to its variable, stored row-major in `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArg {
    pub var: Variable,
    values: Arc<Vec<f64>>,
}

impl BoundArg {
    fn new(var: Variable, values: Vec<f64>) -> Self {
        Self {
            var,
            values: Arc::new(values),
        }
    }

    pub fn rows(&self) -> usize {
        if self.var.dim == 0 {
            0
        } else {
            self.values.len() / self.var.dim
        }
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[f64] {
        let d = self.var.dim;
        &self.values[r * d..(r + 1) * d]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows(), self.var.dim), |(r, c)| {
            self.values[r * self.var.dim + c]
        })
    }
}

/// Validated binding of variables to arguments, indexed by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    args: Vec<BoundArg>,
    m: usize,
    n: usize,
    precision: Precision,
    residency: Residency,
}

fn expected_rows(category: Category, m: Option<usize>, n: Option<usize>) -> Option<usize> {
    match category {
        Category::IndexedByI => m,
        Category::IndexedByJ => n,
        Category::Param => Some(1),
    }
}

impl Binding {
    /// Bind positional arguments to the declared aliases.
    pub fn bind(aliases: &AliasTable, args: &[ArgTensor]) -> ReductionResult<Self> {
        let vars = aliases.by_positions();
        for var in &vars {
            if var.position >= args.len() {
                return Err(ReductionError::ShapeMismatch(
                    ShapeMismatchError::new(var.name.clone(), (None, Some(var.dim)), (0, 0))
                        .with_context(format!(
                            "declared at position {} but only {} arguments were given",
                            var.position,
                            args.len()
                        )),
                ));
            }
        }
        if args.len() > vars.len() {
            let undeclared: Vec<usize> = (0..args.len())
                .filter(|p| vars.iter().all(|v| v.position != *p))
                .collect();
            let first = undeclared[0];
            let listed: Vec<String> = undeclared.iter().map(|p| format!("#{}", p)).collect();
            return Err(ReductionError::ShapeMismatch(
                ShapeMismatchError::new(format!("#{}", first), (None, None), args[first].shape())
                    .with_context(format!(
                        "expected {} arguments, got {}; no variable declared at {}",
                        vars.len(),
                        args.len(),
                        listed.join(", ")
                    )),
            ));
        }

        let precision = args.first().map(|a| a.precision()).unwrap_or_default();
        let residency = args
            .iter()
            .map(|a| a.residency())
            .find(|r| matches!(r, Residency::Device(_)))
            .unwrap_or_default();

        let mut m: Option<usize> = None;
        let mut n: Option<usize> = None;
        let mut bound = Vec::with_capacity(vars.len());
        for var in vars {
            let arg = &args[var.position];
            let (rows, cols) = arg.shape();

            if arg.precision() != precision {
                return Err(ReductionError::ShapeMismatch(
                    ShapeMismatchError::new(var.name.clone(), (None, Some(var.dim)), (rows, cols))
                        .with_context(format!(
                            "{} argument mixed with {} arguments",
                            arg.precision(),
                            precision
                        )),
                ));
            }

            let want = expected_rows(var.category, m, n);
            if cols != var.dim || want.is_some_and(|w| w != rows) {
                return Err(ReductionError::ShapeMismatch(
                    ShapeMismatchError::new(var.name.clone(), (want, Some(var.dim)), (rows, cols))
                        .with_context(format!("declared as {}", var)),
                ));
            }
            match var.category {
                Category::IndexedByI => m = Some(rows),
                Category::IndexedByJ => n = Some(rows),
                Category::Param => {}
            }
            bound.push(BoundArg::new(var.clone(), arg.to_row_major_vec()));
        }

        Ok(Self {
            args: bound,
            m: m.unwrap_or(1),
            n: n.unwrap_or(1),
            precision,
            residency,
        })
    }

    /// Number of `i` indices.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Number of `j` indices.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The argument at `position`.
    pub fn get(&self, position: usize) -> Option<&BoundArg> {
        self.args.get(position)
    }

    pub fn find(&self, name: &str) -> Option<&BoundArg> {
        self.args.iter().find(|a| a.var.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundArg> {
        self.args.iter()
    }

    pub fn category(&self, position: usize) -> Option<Category> {
        self.get(position).map(|a| a.var.category)
    }

    pub fn dim(&self, position: usize) -> Option<usize> {
        self.get(position).map(|a| a.var.dim)
    }

    /// Row `i`, `j` or `0` of the argument at `position`, depending on its category.
    #[inline]
    pub fn row(&self, position: usize, i: usize, j: usize) -> &[f64] {
        let arg = &self.args[position];
        match arg.var.category {
            Category::IndexedByI => arg.row(i),
            Category::IndexedByJ => arg.row(j),
            Category::Param => arg.row(0),
        }
    }

    /// Alias table reproducing the bound variables.
    pub fn aliases(&self) -> AliasTable {
        let mut table = AliasTable::new();
        for arg in &self.args {
            // Positions are unique by construction.
            let _ = table.declare(arg.var.clone());
        }
        table
    }

    /// Append an argument for a fresh variable at the next position.
    pub fn with_argument(
        &self,
        name: impl Into<String>,
        category: Category,
        values: &Array2<f64>,
    ) -> ReductionResult<(Self, Variable)> {
        let (rows, cols) = values.dim();
        let var = Variable::new(name, self.args.len(), category, cols);
        let want = match category {
            Category::IndexedByI => self.m,
            Category::IndexedByJ => self.n,
            Category::Param => 1,
        };
        if rows != want || cols == 0 {
            return Err(ReductionError::shape_mismatch(
                var.name.clone(),
                (Some(want), None),
                (rows, cols),
            ));
        }
        if self.args.iter().any(|a| a.var.name == var.name) {
            return Err(genred_formula::FormulaError::DuplicateAlias { name: var.name }.into());
        }
        let mut next = self.clone();
        next.args
            .push(BoundArg::new(var.clone(), values.iter().copied().collect()));
        Ok((next, var))
    }

    /// Replace the values bound at `position`, keeping its shape.
    pub fn with_values(&self, position: usize, values: Vec<f64>) -> ReductionResult<Self> {
        let arg = self.get(position).ok_or_else(|| {
            ReductionError::shape_mismatch(format!("#{}", position), (None, None), (0, 0))
        })?;
        if values.len() != arg.values.len() {
            return Err(ReductionError::shape_mismatch(
                arg.var.name.clone(),
                (Some(arg.rows()), Some(arg.var.dim)),
                (values.len() / arg.var.dim.max(1), arg.var.dim),
            ));
        }
        let mut next = self.clone();
        next.args[position] = BoundArg::new(arg.var.clone(), values);
        Ok(next)
    }

    /// The binding with the roles of `i` and `j` exchanged.
    pub fn transposed(&self) -> Self {
        Self {
            args: self
                .args
                .iter()
                .map(|a| BoundArg {
                    var: Variable {
                        category: a.var.category.transposed(),
                        ..a.var.clone()
                    },
                    values: Arc::clone(&a.values),
                })
                .collect(),
            m: self.n,
            n: self.m,
            precision: self.precision,
            residency: self.residency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use scirs2_core::ndarray::{array, Array2};

    fn aliases() -> AliasTable {
        AliasTable::parse(&["x = Vx(3)", "y = Vy(3)", "p = Pm(1)"]).unwrap()
    }

    fn args(m: usize, n: usize) -> Vec<ArgTensor> {
        vec![
            ArgTensor::from_f64(Array2::zeros((m, 3))),
            ArgTensor::from_f64(Array2::zeros((n, 3))),
            ArgTensor::from_f64(array![[0.5]]),
        ]
    }

    #[test]
    fn test_bind_sizes() {
        let b = Binding::bind(&aliases(), &args(5, 7)).unwrap();
        assert_eq!(b.m(), 5);
        assert_eq!(b.n(), 7);
        assert_eq!(b.len(), 3);
        assert_eq!(b.category(2), Some(Category::Param));
        assert_eq!(b.row(2, 4, 6), &[0.5]);
    }

    #[test]
    fn test_bind_wrong_columns_names_variable() {
        let mut a = args(5, 7);
        a[1] = ArgTensor::from_f64(Array2::zeros((7, 2)));
        match Binding::bind(&aliases(), &a) {
            Err(ReductionError::ShapeMismatch(e)) => {
                assert_eq!(e.variable, "y");
                assert_eq!(e.actual, (7, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bind_inconsistent_rows() {
        let table = AliasTable::parse(&["x = Vx(3)", "y = Vy(3)", "z = Vx(1)"]).unwrap();
        let a = vec![
            ArgTensor::from_f64(Array2::zeros((5, 3))),
            ArgTensor::from_f64(Array2::zeros((4, 3))),
            ArgTensor::from_f64(Array2::zeros((6, 1))),
        ];
        match Binding::bind(&table, &a) {
            Err(ReductionError::ShapeMismatch(e)) => {
                assert_eq!(e.variable, "z");
                assert_eq!(e.expected, (Some(5), Some(1)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bind_param_must_have_one_row() {
        let mut a = args(2, 2);
        a[2] = ArgTensor::from_f64(array![[1.0], [2.0]]);
        assert!(matches!(
            Binding::bind(&aliases(), &a),
            Err(ReductionError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_bind_argument_count() {
        let a = args(2, 2);
        assert!(Binding::bind(&aliases(), &a[..2]).is_err());

        let mut extra = args(2, 2);
        extra.push(ArgTensor::from_f64(array![[1.0]]));
        extra.push(ArgTensor::from_f64(array![[2.0, 3.0]]));
        match Binding::bind(&aliases(), &extra) {
            Err(ReductionError::ShapeMismatch(e)) => {
                assert_eq!(e.variable, "#3");
                assert_eq!(e.actual, (1, 1));
                assert_eq!(
                    e.context.as_deref(),
                    Some("expected 3 arguments, got 5; no variable declared at #3, #4")
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bind_rejects_mixed_precision() {
        let mut a = args(2, 2);
        a[0] = ArgTensor::from_f32(Array2::zeros((2, 3)));
        assert!(matches!(
            Binding::bind(&aliases(), &a),
            Err(ReductionError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_default_domain_sizes() {
        let table = AliasTable::parse(&["x = Vx(2)"]).unwrap();
        let b = Binding::bind(&table, &[ArgTensor::from_f64(Array2::zeros((4, 2)))]).unwrap();
        assert_eq!(b.m(), 4);
        assert_eq!(b.n(), 1);
    }

    #[test]
    fn test_residency_and_transpose() {
        let mut a = args(3, 4);
        a[1] = a[1].clone().on_device(Device::gpu(0));
        let b = Binding::bind(&aliases(), &a).unwrap();
        assert_eq!(b.residency(), Residency::Device(Device::gpu(0)));

        let t = b.transposed();
        assert_eq!(t.m(), 4);
        assert_eq!(t.n(), 3);
        assert_eq!(t.category(0), Some(Category::IndexedByJ));
    }

    #[test]
    fn test_with_argument_and_values() {
        let b = Binding::bind(&aliases(), &args(3, 4)).unwrap();
        let (b2, g) = b
            .with_argument("g", Category::IndexedByI, &Array2::ones((3, 2)))
            .unwrap();
        assert_eq!(g.position, 3);
        assert_eq!(b2.row(3, 1, 0), &[1.0, 1.0]);
        assert!(b
            .with_argument("g", Category::IndexedByI, &Array2::ones((4, 2)))
            .is_err());

        let b3 = b2.with_values(2, vec![2.0]).unwrap();
        assert_eq!(b3.row(2, 0, 0), &[2.0]);
        assert!(b2.with_values(2, vec![1.0, 2.0]).is_err());
    }
}
