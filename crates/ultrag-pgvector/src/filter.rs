//! Compilation of [`FilterExpression`]s into parameterised SQL predicates.

use serde_json::Value;
use ultrag_core::{Condition, FilterClause, FilterExpression, UltragError};

/// A value bound to one placeholder of a compiled predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// A metadata key, bound as `text`.
    Text(String),
    /// A comparison value, bound as `jsonb`.
    Json(Value),
}

/// A `WHERE` predicate over the `metadata` column plus its bind values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledSql {
    /// Empty when the filter places no restriction.
    pub clause: String,
    /// Values for `$first..` in placeholder order.
    pub params: Vec<SqlParam>,
}

impl CompiledSql {
    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }
}

/// Compile `filter` into a predicate whose placeholders start at
/// `$first_placeholder`.
///
/// Every condition becomes `(metadata -> $k) = $v`. Keys and values are
/// always bound, never spliced into the SQL text.
pub fn compile_sql(
    filter: &FilterExpression,
    first_placeholder: usize,
) -> Result<CompiledSql, UltragError> {
    let mut compiler = Compiler {
        next: first_placeholder,
        params: Vec::new(),
    };

    let parts = filter
        .clauses
        .iter()
        .map(|clause| compiler.clause(clause))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledSql {
        clause: parts.join(" AND "),
        params: compiler.params,
    })
}

struct Compiler {
    next: usize,
    params: Vec<SqlParam>,
}

impl Compiler {
    fn clause(&mut self, clause: &FilterClause) -> Result<String, UltragError> {
        match clause {
            FilterClause::Eq(condition) => self.condition(condition),
            FilterClause::AnyOf(groups) => {
                if groups.is_empty() {
                    return Err(UltragError::BackendQuery(
                        "malformed filter: disjunction without alternatives".to_string(),
                    ));
                }
                let alternatives = groups
                    .iter()
                    .map(|group| self.group(group))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", alternatives.join(" OR ")))
            }
        }
    }

    fn group(&mut self, group: &[Condition]) -> Result<String, UltragError> {
        if group.is_empty() {
            return Err(UltragError::BackendQuery(
                "malformed filter: empty condition group".to_string(),
            ));
        }
        let conditions = group
            .iter()
            .map(|c| self.condition(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("({})", conditions.join(" AND ")))
    }

    fn condition(&mut self, condition: &Condition) -> Result<String, UltragError> {
        if condition.key.is_empty() {
            return Err(UltragError::BackendQuery(
                "malformed filter: empty metadata key".to_string(),
            ));
        }
        let key = self.push(SqlParam::Text(condition.key.clone()));
        let value = self.push(SqlParam::Json(condition.value.to_json()));
        Ok(format!("(metadata -> ${key}) = ${value}"))
    }

    fn push(&mut self, param: SqlParam) -> usize {
        let placeholder = self.next;
        self.params.push(param);
        self.next += 1;
        placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_compiles_to_nothing() {
        let compiled = compile_sql(&FilterExpression::new(), 2).unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn single_condition() {
        let filter = FilterExpression::new().eq("access_level", "common");
        let compiled = compile_sql(&filter, 2).unwrap();
        assert_eq!(compiled.clause, "(metadata -> $2) = $3");
        assert_eq!(
            compiled.params,
            vec![
                SqlParam::Text("access_level".into()),
                SqlParam::Json(json!("common")),
            ]
        );
    }

    #[test]
    fn visibility_rule_compiles_to_or() {
        let compiled = compile_sql(&FilterExpression::visibility(Some("u1")), 2).unwrap();
        assert_eq!(
            compiled.clause,
            "(((metadata -> $2) = $3) OR ((metadata -> $4) = $5))"
        );
        assert_eq!(
            compiled.params,
            vec![
                SqlParam::Text("user_id".into()),
                SqlParam::Json(json!("u1")),
                SqlParam::Text("access_level".into()),
                SqlParam::Json(json!("common")),
            ]
        );
    }

    #[test]
    fn clauses_and_groups_are_conjoined() {
        let filter = FilterExpression::new()
            .eq("page", 3_i64)
            .any_of(vec![vec![Condition::new("a", true), Condition::new("b", "x")]]);
        let compiled = compile_sql(&filter, 1).unwrap();
        assert_eq!(
            compiled.clause,
            "(metadata -> $1) = $2 AND (((metadata -> $3) = $4 AND (metadata -> $5) = $6))"
        );
        assert_eq!(compiled.params.len(), 6);
        assert_eq!(compiled.params[1], SqlParam::Json(json!(3)));
        assert_eq!(compiled.params[3], SqlParam::Json(json!(true)));
    }

    #[test]
    fn hostile_values_stay_in_params() {
        let filter = FilterExpression::new().eq("user_id", "x' OR '1'='1");
        let compiled = compile_sql(&filter, 2).unwrap();
        assert!(!compiled.clause.contains('\''));
        assert_eq!(compiled.params[1], SqlParam::Json(json!("x' OR '1'='1")));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        for filter in [
            FilterExpression::new().any_of(vec![]),
            FilterExpression::new().any_of(vec![vec![]]),
            FilterExpression::new().eq("", "x"),
        ] {
            assert!(matches!(
                compile_sql(&filter, 2),
                Err(UltragError::BackendQuery(_))
            ));
        }
    }
}
