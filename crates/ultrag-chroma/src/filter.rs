//! Compilation of [`FilterExpression`]s into Chroma `where` documents.

use serde_json::{json, Map, Value};
use ultrag_core::{Condition, FilterClause, FilterExpression, UltragError};

/// Compile `filter` into a Chroma `where` document.
///
/// Returns `Ok(None)` for an empty expression: Chroma treats an absent
/// `where` as "no restriction". Chroma rejects `$and`/`$or` with a single
/// operand, so one-element lists collapse to their only member.
pub fn compile_where(filter: &FilterExpression) -> Result<Option<Value>, UltragError> {
    let mut clauses = filter
        .clauses
        .iter()
        .map(compile_clause)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(json!({ "$and": clauses })),
    })
}

fn compile_clause(clause: &FilterClause) -> Result<Value, UltragError> {
    match clause {
        FilterClause::Eq(condition) => compile_condition(condition),
        FilterClause::AnyOf(groups) => {
            if groups.is_empty() {
                return Err(UltragError::BackendQuery(
                    "malformed filter: disjunction without alternatives".to_string(),
                ));
            }
            let mut alternatives = groups
                .iter()
                .map(|group| compile_group(group))
                .collect::<Result<Vec<_>, _>>()?;
            if alternatives.len() == 1 {
                return Ok(alternatives.remove(0));
            }
            Ok(json!({ "$or": alternatives }))
        }
    }
}

fn compile_group(group: &[Condition]) -> Result<Value, UltragError> {
    let mut conditions = group
        .iter()
        .map(compile_condition)
        .collect::<Result<Vec<_>, _>>()?;
    match conditions.len() {
        0 => Err(UltragError::BackendQuery(
            "malformed filter: empty condition group".to_string(),
        )),
        1 => Ok(conditions.remove(0)),
        _ => Ok(json!({ "$and": conditions })),
    }
}

fn compile_condition(condition: &Condition) -> Result<Value, UltragError> {
    // A `$`-prefixed key would be read by Chroma as an operator.
    if condition.key.is_empty() || condition.key.starts_with('$') {
        return Err(UltragError::BackendQuery(format!(
            "malformed filter: invalid metadata key '{}'",
            condition.key
        )));
    }

    let mut object = Map::new();
    object.insert(
        condition.key.clone(),
        json!({ "$eq": condition.value.to_json() }),
    );
    Ok(Value::Object(object))
}
