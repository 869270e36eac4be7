//! # Planner
//!
//! Picks an access path for one statement's WHERE clause. The decision is
//! purely rule-based:
//!
//! 1. Split the predicate into AND conjuncts. Anything under an OR or a
//!    NOT is opaque and contributes nothing.
//! 2. Keep the `field op literal` conjuncts and fold them into per-field
//!    constraints (an equality, or tightest low/high bounds).
//! 3. Match the table's indexes against the constraints and keep the
//!    candidates that can serve at least their first field.
//! 4. Prefer unique indexes, then exact matches over ranges over
//!    composite prefixes, then the lexicographically smallest index name
//!    so plans are deterministic.
//!
//! Every comparison runs on the same total value order the key encoding
//! preserves, so a scan through an index visits exactly the rows a full
//! scan would keep. The executor still re-applies the complete WHERE
//! clause to every row; the access path only narrows how many rows are
//! fetched.

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::debug;

use super::ast::{BinaryOperator, Expr};
use crate::database::catalog::IndexConfig;
use crate::database::index::{IndexPredicate, RangeBounds};
use crate::types::{FieldPath, Value};

/// How the executor should fetch candidate rows.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    /// Scan the whole table in primary key order.
    FullScan,
    /// Scan one index with the given predicate.
    Index {
        config: IndexConfig,
        predicate: IndexPredicate,
    },
}

#[derive(Debug, Default, Clone)]
struct FieldConstraints {
    eq: Option<Value>,
    low: Option<(Value, bool)>,
    high: Option<(Value, bool)>,
}

impl FieldConstraints {
    fn add_low(&mut self, value: Value, inclusive: bool) {
        let tighter = match &self.low {
            Some((current, current_incl)) => {
                value > *current || (value == *current && *current_incl && !inclusive)
            }
            None => true,
        };
        if tighter {
            self.low = Some((value, inclusive));
        }
    }

    fn add_high(&mut self, value: Value, inclusive: bool) {
        let tighter = match &self.high {
            Some((current, current_incl)) => {
                value < *current || (value == *current && *current_incl && !inclusive)
            }
            None => true,
        };
        if tighter {
            self.high = Some((value, inclusive));
        }
    }
}

/// Chooses the access path for a WHERE clause over a table with the given
/// indexes.
pub fn plan(indexes: &[IndexConfig], where_clause: Option<&Expr>) -> AccessPath {
    let Some(predicate) = where_clause else {
        return AccessPath::FullScan;
    };
    let constraints = collect_constraints(predicate);
    if constraints.is_empty() {
        return AccessPath::FullScan;
    }

    let mut best: Option<(Candidate, &IndexConfig, IndexPredicate)> = None;
    for config in indexes {
        let Some(predicate) = match_index(config, &constraints) else {
            continue;
        };
        let candidate = Candidate {
            non_unique: !config.unique,
            kind_rank: kind_rank(&predicate),
            name: config.name.clone(),
        };
        let replace = match &best {
            Some((current, _, _)) => candidate < *current,
            None => true,
        };
        if replace {
            best = Some((candidate, config, predicate));
        }
    }

    match best {
        Some((_, config, predicate)) => {
            debug!(index = %config.name, ?predicate, "index scan selected");
            AccessPath::Index {
                config: config.clone(),
                predicate,
            }
        }
        None => {
            debug!("no usable index, full scan");
            AccessPath::FullScan
        }
    }
}

/// Sort key for candidate comparison; smaller wins.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    non_unique: bool,
    kind_rank: u8,
    name: String,
}

fn kind_rank(predicate: &IndexPredicate) -> u8 {
    match predicate {
        IndexPredicate::Eq(_) => 0,
        IndexPredicate::Range(_) => 1,
        IndexPredicate::Prefix(_) => 2,
    }
}

fn collect_constraints(predicate: &Expr) -> HashMap<FieldPath, FieldConstraints> {
    let mut conjuncts: SmallVec<[&Expr; 8]> = SmallVec::new();
    split_and(predicate, &mut conjuncts);

    let mut constraints: HashMap<FieldPath, FieldConstraints> = HashMap::new();
    for conjunct in conjuncts {
        let Some((path, op, value)) = as_field_comparison(conjunct) else {
            continue;
        };
        let entry = constraints.entry(path.clone()).or_default();
        match op {
            BinaryOperator::Eq => entry.eq = Some(value.clone()),
            BinaryOperator::Gt => entry.add_low(value.clone(), false),
            BinaryOperator::GtEq => entry.add_low(value.clone(), true),
            BinaryOperator::Lt => entry.add_high(value.clone(), false),
            BinaryOperator::LtEq => entry.add_high(value.clone(), true),
            _ => {}
        }
    }
    constraints
}

fn split_and<'a>(expr: &'a Expr, out: &mut SmallVec<[&'a Expr; 8]>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            split_and(left, out);
            split_and(right, out);
        }
        other => out.push(other),
    }
}

/// Recognizes `field op literal` and `literal op field`, normalizing the
/// latter by flipping the operator.
fn as_field_comparison(expr: &Expr) -> Option<(&FieldPath, BinaryOperator, &Value)> {
    let Expr::BinaryOp { left, op, right } = expr else {
        return None;
    };
    if !op.is_comparison() {
        return None;
    }
    match (left.as_ref(), right.as_ref()) {
        (Expr::Field(path), Expr::Literal(value)) => Some((path, *op, value)),
        (Expr::Literal(value), Expr::Field(path)) => Some((path, flip(*op), value)),
        _ => None,
    }
}

fn flip(op: BinaryOperator) -> BinaryOperator {
    match op {
        BinaryOperator::Lt => BinaryOperator::Gt,
        BinaryOperator::LtEq => BinaryOperator::GtEq,
        BinaryOperator::Gt => BinaryOperator::Lt,
        BinaryOperator::GtEq => BinaryOperator::LtEq,
        other => other,
    }
}

fn match_index(
    config: &IndexConfig,
    constraints: &HashMap<FieldPath, FieldConstraints>,
) -> Option<IndexPredicate> {
    let mut eq_values = Vec::new();
    for field in &config.fields {
        match constraints.get(field).and_then(|c| c.eq.clone()) {
            Some(value) => eq_values.push(value),
            None => break,
        }
    }
    if eq_values.len() == config.fields.len() {
        return Some(IndexPredicate::Eq(eq_values));
    }
    if !eq_values.is_empty() {
        return Some(IndexPredicate::Prefix(eq_values));
    }
    let first = constraints.get(&config.fields[0])?;
    if first.low.is_none() && first.high.is_none() {
        return None;
    }
    Some(IndexPredicate::Range(RangeBounds {
        low: first.low.clone(),
        high: first.high.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse_script;
    use crate::sql::ast::Statement;

    fn where_of(sql: &str) -> Expr {
        let Statement::Select(stmt) = parse_script(sql).unwrap().remove(0) else {
            panic!("expected SELECT")
        };
        stmt.where_clause.unwrap()
    }

    fn index(name: &str, unique: bool, fields: &[&str]) -> IndexConfig {
        IndexConfig {
            name: name.into(),
            table: "t".into(),
            unique,
            fields: fields.iter().map(|f| FieldPath::parse(f).unwrap()).collect(),
        }
    }

    #[test]
    fn no_where_clause_is_a_full_scan() {
        assert_eq!(plan(&[index("ix", false, &["a"])], None), AccessPath::FullScan);
    }

    #[test]
    fn equality_on_indexed_field_picks_eq_scan() {
        let expr = where_of("SELECT * FROM t WHERE a = 3");
        let path = plan(&[index("ix", false, &["a"])], Some(&expr));
        let AccessPath::Index { predicate, .. } = path else {
            panic!("expected index scan")
        };
        assert_eq!(predicate, IndexPredicate::Eq(vec![Value::Int(3)]));
    }

    #[test]
    fn literal_on_left_side_is_normalized() {
        let expr = where_of("SELECT * FROM t WHERE 3 < a");
        let path = plan(&[index("ix", false, &["a"])], Some(&expr));
        let AccessPath::Index { predicate, .. } = path else {
            panic!("expected index scan")
        };
        assert_eq!(
            predicate,
            IndexPredicate::Range(RangeBounds {
                low: Some((Value::Int(3), false)),
                high: None,
            })
        );
    }

    #[test]
    fn range_bounds_are_merged_to_the_tightest() {
        let expr = where_of("SELECT * FROM t WHERE a > 1 AND a > 5 AND a <= 9");
        let path = plan(&[index("ix", false, &["a"])], Some(&expr));
        let AccessPath::Index { predicate, .. } = path else {
            panic!()
        };
        assert_eq!(
            predicate,
            IndexPredicate::Range(RangeBounds {
                low: Some((Value::Int(5), false)),
                high: Some((Value::Int(9), true)),
            })
        );
    }

    #[test]
    fn or_predicates_cannot_use_indexes() {
        let expr = where_of("SELECT * FROM t WHERE a = 1 OR a = 2");
        assert_eq!(plan(&[index("ix", false, &["a"])], Some(&expr)), AccessPath::FullScan);
    }

    #[test]
    fn composite_index_with_leading_equality_picks_prefix() {
        let expr = where_of("SELECT * FROM t WHERE a = 1");
        let path = plan(&[index("ix", false, &["a", "b"])], Some(&expr));
        let AccessPath::Index { predicate, .. } = path else {
            panic!()
        };
        assert_eq!(predicate, IndexPredicate::Prefix(vec![Value::Int(1)]));
    }

    #[test]
    fn composite_index_without_leading_field_is_unusable() {
        let expr = where_of("SELECT * FROM t WHERE b = 1");
        assert_eq!(
            plan(&[index("ix", false, &["a", "b"])], Some(&expr)),
            AccessPath::FullScan
        );
    }

    #[test]
    fn unique_index_beats_non_unique_eq() {
        let expr = where_of("SELECT * FROM t WHERE a = 1 AND b = 1");
        let path = plan(
            &[index("a_ix", false, &["a"]), index("b_ix", true, &["b"])],
            Some(&expr),
        );
        let AccessPath::Index { config, .. } = path else {
            panic!()
        };
        assert_eq!(config.name, "b_ix");
    }

    #[test]
    fn eq_beats_range_and_name_breaks_ties() {
        let expr = where_of("SELECT * FROM t WHERE a > 1 AND b = 2");
        let path = plan(
            &[index("a_ix", false, &["a"]), index("b_ix", false, &["b"])],
            Some(&expr),
        );
        let AccessPath::Index { config, .. } = path else {
            panic!()
        };
        assert_eq!(config.name, "b_ix");

        let expr = where_of("SELECT * FROM t WHERE a = 1");
        let path = plan(
            &[index("z_ix", false, &["a"]), index("a_ix", false, &["a"])],
            Some(&expr),
        );
        let AccessPath::Index { config, .. } = path else {
            panic!()
        };
        assert_eq!(config.name, "a_ix");
    }
}
