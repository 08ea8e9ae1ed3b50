//! Variables, index categories and alias declarations.
//!
//! An alias binds a formula name to an argument slot:
//!
//! ```text
//! x = Vx(3)        // indexed by i, dimension 3, next free position
//! p = Pm(0, 1)     // parameter at position 0, dimension 1
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FormulaError, FormulaResult};

/// Which index a variable is indexed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// One row per `i` (declared with `Vx` or `Vi`)
    IndexedByI,
    /// One row per `j` (declared with `Vy` or `Vj`)
    IndexedByJ,
    /// A single broadcast row (declared with `Pm`)
    Param,
}

impl Category {
    /// Parse the category tag used in alias declarations.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Vx" | "Vi" => Some(Category::IndexedByI),
            "Vy" | "Vj" => Some(Category::IndexedByJ),
            "Pm" => Some(Category::Param),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Category::IndexedByI => "Vx",
            Category::IndexedByJ => "Vy",
            Category::Param => "Pm",
        }
    }

    /// Numeric code of the legacy call signatures (0 = i, 1 = j, 2 = parameter).
    pub fn code(&self) -> u8 {
        match self {
            Category::IndexedByI => 0,
            Category::IndexedByJ => 1,
            Category::Param => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Category::IndexedByI),
            1 => Some(Category::IndexedByJ),
            2 => Some(Category::Param),
            _ => None,
        }
    }

    /// The category with the roles of `i` and `j` exchanged.
    pub fn transposed(&self) -> Self {
        match self {
            Category::IndexedByI => Category::IndexedByJ,
            Category::IndexedByJ => Category::IndexedByI,
            Category::Param => Category::Param,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A formula variable bound to an argument position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub position: usize,
    pub category: Category,
    pub dim: usize,
}

impl Variable {
    pub fn new(name: impl Into<String>, position: usize, category: Category, dim: usize) -> Self {
        Variable {
            name: name.into(),
            position,
            category,
            dim,
        }
    }

    /// Two variables denote the same argument when their positions agree.
    pub fn same_slot(&self, other: &Variable) -> bool {
        self.position == other.position
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {}({}, {})",
            self.name, self.category, self.position, self.dim
        )
    }
}

/// Parse one alias declaration. `default_position` is used when the
/// declaration only gives a dimension.
pub fn parse_alias(decl: &str, default_position: usize) -> FormulaResult<Variable> {
    let (name, rhs) = decl
        .split_once('=')
        .ok_or_else(|| FormulaError::invalid_alias(decl, "missing '='"))?;
    let name = name.trim();
    if name.is_empty() || !is_identifier(name) {
        return Err(FormulaError::invalid_alias(decl, "invalid variable name"));
    }
    if crate::parser::keyword_constant(name).is_some() {
        return Err(FormulaError::invalid_alias(decl, "reserved name"));
    }

    let rhs = rhs.trim();
    let open = rhs
        .find('(')
        .ok_or_else(|| FormulaError::invalid_alias(decl, "expected Cat(...)"))?;
    if !rhs.ends_with(')') {
        return Err(FormulaError::invalid_alias(decl, "missing ')'"));
    }
    let tag = rhs[..open].trim();
    let category = Category::from_tag(tag).ok_or_else(|| {
        FormulaError::invalid_alias(decl, format!("unknown category '{}'", tag))
    })?;

    let numbers: Vec<usize> = rhs[open + 1..rhs.len() - 1]
        .split(',')
        .map(|s| s.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|_| FormulaError::invalid_alias(decl, "arguments must be non-negative integers"))?;

    let (position, dim) = match numbers.as_slice() {
        [dim] => (default_position, *dim),
        [position, dim] => (*position, *dim),
        _ => {
            return Err(FormulaError::invalid_alias(
                decl,
                "expected Cat(dim) or Cat(position, dim)",
            ))
        }
    };
    if dim == 0 {
        return Err(FormulaError::invalid_alias(decl, "dimension must be positive"));
    }

    Ok(Variable::new(name, position, category, dim))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Ordered set of alias declarations for one formula invocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasTable {
    vars: Vec<Variable>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of declarations. Declarations without an explicit
    /// position take their index in the list.
    pub fn parse<S: AsRef<str>>(decls: &[S]) -> FormulaResult<Self> {
        let mut table = AliasTable::new();
        for (index, decl) in decls.iter().enumerate() {
            table.declare(parse_alias(decl.as_ref(), index)?)?;
        }
        Ok(table)
    }

    /// Add a variable, rejecting duplicate names and positions.
    pub fn declare(&mut self, var: Variable) -> FormulaResult<()> {
        if self.get(&var.name).is_some() {
            return Err(FormulaError::DuplicateAlias { name: var.name });
        }
        if let Some(existing) = self.by_position(var.position) {
            return Err(FormulaError::DuplicatePosition {
                position: var.position,
                first: existing.name.clone(),
                second: var.name,
            });
        }
        self.vars.push(var);
        Ok(())
    }

    /// Declare a fresh variable at the first free position.
    pub fn declare_next(
        &mut self,
        name: impl Into<String>,
        category: Category,
        dim: usize,
    ) -> FormulaResult<Variable> {
        let var = Variable::new(name, self.next_position(), category, dim);
        self.declare(var.clone())?;
        Ok(var)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn by_position(&self, position: usize) -> Option<&Variable> {
        self.vars.iter().find(|v| v.position == position)
    }

    pub fn next_position(&self) -> usize {
        self.vars.iter().map(|v| v.position + 1).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    /// Variables sorted by position.
    pub fn by_positions(&self) -> Vec<&Variable> {
        let mut vars: Vec<&Variable> = self.vars.iter().collect();
        vars.sort_by_key(|v| v.position);
        vars
    }

    /// A copy of this table with `i` and `j` exchanged.
    pub fn transposed(&self) -> Self {
        AliasTable {
            vars: self
                .vars
                .iter()
                .map(|v| Variable {
                    category: v.category.transposed(),
                    ..v.clone()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alias_short_form() {
        let v = parse_alias("x = Vx(3)", 4).unwrap();
        assert_eq!(v.name, "x");
        assert_eq!(v.position, 4);
        assert_eq!(v.category, Category::IndexedByI);
        assert_eq!(v.dim, 3);
    }

    #[test]
    fn test_parse_alias_with_position() {
        let v = parse_alias("p=Pm(0,1)", 7).unwrap();
        assert_eq!(v.position, 0);
        assert_eq!(v.category, Category::Param);
        assert_eq!(v.dim, 1);
    }

    #[test]
    fn test_parse_alias_errors() {
        assert!(parse_alias("x Vx(3)", 0).is_err());
        assert!(parse_alias("x = Vz(3)", 0).is_err());
        assert!(parse_alias("x = Vx(0)", 0).is_err());
        assert!(parse_alias("x = Vx(1,2,3)", 0).is_err());
        assert!(parse_alias("1x = Vx(3)", 0).is_err());
        assert!(parse_alias("x = Vx(a)", 0).is_err());
    }

    #[test]
    fn test_alias_table_positions() {
        let table = AliasTable::parse(&["p=Pm(0,1)", "a=Vy(1,1)", "x=Vx(2,3)", "y=Vy(3,3)"]).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.by_position(2).unwrap().name, "x");
        assert_eq!(table.next_position(), 4);
    }

    #[test]
    fn test_alias_table_rejects_duplicates() {
        assert!(matches!(
            AliasTable::parse(&["x = Vx(3)", "x = Vy(3)"]),
            Err(FormulaError::DuplicateAlias { .. })
        ));
        assert!(matches!(
            AliasTable::parse(&["x = Vx(0, 3)", "y = Vy(0, 3)"]),
            Err(FormulaError::DuplicatePosition { position: 0, .. })
        ));
    }

    #[test]
    fn test_declare_next_and_transpose() {
        let mut table = AliasTable::parse(&["x = Vx(3)", "y = Vy(3)"]).unwrap();
        let g = table.declare_next("g", Category::IndexedByI, 1).unwrap();
        assert_eq!(g.position, 2);

        let t = table.transposed();
        assert_eq!(t.get("x").unwrap().category, Category::IndexedByJ);
        assert_eq!(t.get("y").unwrap().category, Category::IndexedByI);
    }

    #[test]
    fn test_category_codes() {
        for cat in [Category::IndexedByI, Category::IndexedByJ, Category::Param] {
            assert_eq!(Category::from_code(cat.code()), Some(cat));
            assert_eq!(Category::from_tag(cat.tag()), Some(cat));
        }
        assert_eq!(Category::from_code(3), None);
    }
}
