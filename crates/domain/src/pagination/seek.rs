use std::cmp::Ordering;

use super::cursor::CursorError;
use super::sort_key::{FieldValue, FieldValues, SortDirection, SortField, SortKeyTuple};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Less,
    Greater,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::Less => "<",
            Comparison::Greater => ">",
        }
    }

    fn holds(self, natural: Ordering) -> bool {
        match self {
            Comparison::Equal => natural.is_eq(),
            Comparison::Less => natural.is_lt(),
            Comparison::Greater => natural.is_gt(),
        }
    }

    fn strictly_after(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Desc => Comparison::Less,
            SortDirection::Asc => Comparison::Greater,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeekCondition {
    pub key_index: usize,
    pub field: SortField,
    pub comparison: Comparison,
}

/// One disjunct of the seek chain: equality on a key prefix, then a single
/// strict comparison on the next key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeekTerm {
    pub conditions: Vec<SeekCondition>,
}

/// Admits exactly the rows that come strictly after a boundary in tuple order.
///
/// Without a boundary every row is admitted. The predicate is kept as data so
/// that in-memory executors evaluate the same chain that SQL executors render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeekPredicate {
    tuple: SortKeyTuple,
    boundary: Option<FieldValues>,
    terms: Vec<SeekTerm>,
}

impl SeekPredicate {
    pub fn first_page(tuple: SortKeyTuple) -> Self {
        Self {
            tuple,
            boundary: None,
            terms: Vec::new(),
        }
    }

    pub fn build(tuple: SortKeyTuple, boundary: Option<FieldValues>) -> Result<Self, CursorError> {
        let Some(boundary) = boundary else {
            return Ok(Self::first_page(tuple));
        };
        tuple
            .check_shape(&boundary)
            .map_err(CursorError::SchemaMismatch)?;

        let keys = tuple.keys();
        let terms = (0..keys.len())
            .map(|depth| {
                let mut conditions: Vec<SeekCondition> = keys[..depth]
                    .iter()
                    .enumerate()
                    .map(|(key_index, key)| SeekCondition {
                        key_index,
                        field: key.field,
                        comparison: Comparison::Equal,
                    })
                    .collect();
                conditions.push(SeekCondition {
                    key_index: depth,
                    field: keys[depth].field,
                    comparison: Comparison::strictly_after(keys[depth].direction),
                });
                SeekTerm { conditions }
            })
            .collect();

        Ok(Self {
            tuple,
            boundary: Some(boundary),
            terms,
        })
    }

    pub fn tuple(&self) -> &SortKeyTuple {
        &self.tuple
    }

    pub fn boundary(&self) -> Option<&FieldValues> {
        self.boundary.as_ref()
    }

    pub fn terms(&self) -> &[SeekTerm] {
        &self.terms
    }

    pub fn is_first_page(&self) -> bool {
        self.boundary.is_none()
    }

    /// Evaluates the chain against a row's resolved sort values.
    pub fn admits(&self, values: &FieldValues) -> bool {
        let Some(boundary) = &self.boundary else {
            return true;
        };
        self.terms.iter().any(|term| {
            term.conditions.iter().all(|condition| {
                match (
                    values.get(condition.key_index),
                    boundary.get(condition.key_index),
                ) {
                    (Some(value), Some(bound)) => condition.comparison.holds(value.cmp(bound)),
                    _ => false,
                }
            })
        })
    }

    /// Renders ORDER BY and the seek fragment, binding each boundary value once.
    pub fn render(&self, params: &mut SqlParams) -> SeekSql {
        let order_by = self
            .tuple
            .keys()
            .iter()
            .map(|key| format!("{} {}", key.field.column(), key.direction.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");

        let where_fragment = self.boundary.as_ref().map(|boundary| {
            let placeholders: Vec<String> = boundary
                .iter()
                .map(|value| params.bind(value.clone()))
                .collect();
            let disjuncts = self
                .terms
                .iter()
                .map(|term| {
                    let conjuncts = term
                        .conditions
                        .iter()
                        .map(|condition| {
                            format!(
                                "{} {} {}",
                                condition.field.column(),
                                condition.comparison.as_sql(),
                                placeholders[condition.key_index]
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    format!("({conjuncts})")
                })
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("({disjuncts})")
        });

        SeekSql {
            order_by,
            where_fragment,
        }
    }
}

/// Positional parameters for a rendered statement, named `$p1`, `$p2`, ...
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SqlParams {
    values: Vec<FieldValue>,
}

impl SqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` and returns its placeholder.
    pub fn bind(&mut self, value: impl Into<FieldValue>) -> String {
        self.values.push(value.into());
        format!("$p{}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Parameter names without the `$` sigil, paired with their values.
    pub fn into_bindings(self) -> Vec<(String, FieldValue)> {
        self.values
            .into_iter()
            .enumerate()
            .map(|(index, value)| (format!("p{}", index + 1), value))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeekSql {
    pub order_by: String,
    pub where_fragment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeekStatement {
    pub order_by: String,
    pub where_fragment: Option<String>,
    pub parameters: Vec<FieldValue>,
}

pub fn build_sql(
    tuple: SortKeyTuple,
    boundary: Option<FieldValues>,
) -> Result<SeekStatement, CursorError> {
    let predicate = SeekPredicate::build(tuple, boundary)?;
    let mut params = SqlParams::new();
    let rendered = predicate.render(&mut params);
    Ok(SeekStatement {
        order_by: rendered.order_by,
        where_fragment: rendered.where_fragment,
        parameters: params.values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::sort_key::{ListingKind, SortMode, tuple_for};

    fn hot_posts() -> SortKeyTuple {
        tuple_for(ListingKind::Posts, SortMode::Hot).expect("tuple")
    }

    fn hot(score: i64, count: i64, created: i64, id: i64) -> FieldValues {
        FieldValues::new(vec![
            FieldValue::Int(score),
            FieldValue::Int(count),
            FieldValue::Timestamp(created),
            FieldValue::Int(id),
        ])
    }

    #[test]
    fn first_page_has_ordering_but_no_predicate() {
        let statement = build_sql(hot_posts(), None).expect("statement");
        assert_eq!(
            statement.order_by,
            "score DESC, secondary_count DESC, created_date DESC, id DESC"
        );
        assert_eq!(statement.where_fragment, None);
        assert!(statement.parameters.is_empty());
    }

    #[test]
    fn renders_lexicographic_or_chain() {
        let statement = build_sql(hot_posts(), Some(hot(10, 2, 5, 4))).expect("statement");
        assert_eq!(
            statement.where_fragment.as_deref(),
            Some(
                "((score < $p1) \
                 OR (score = $p1 AND secondary_count < $p2) \
                 OR (score = $p1 AND secondary_count = $p2 AND created_date < $p3) \
                 OR (score = $p1 AND secondary_count = $p2 AND created_date = $p3 AND id < $p4))"
            )
        );
        assert_eq!(statement.parameters, hot(10, 2, 5, 4).into_inner());
    }

    #[test]
    fn ascending_keys_seek_upwards() {
        let tuple = tuple_for(ListingKind::Topics, SortMode::Alpha).expect("tuple");
        let boundary = FieldValues::new(vec![
            FieldValue::Text("rust".into()),
            FieldValue::Timestamp(3),
            FieldValue::Int(7),
        ]);
        let statement = build_sql(tuple, Some(boundary)).expect("statement");
        assert_eq!(statement.order_by, "title ASC, created_date DESC, id DESC");
        let fragment = statement.where_fragment.expect("fragment");
        assert!(fragment.starts_with("((title > $p1) OR"));
    }

    #[test]
    fn placeholders_continue_after_filter_bindings() {
        let mut params = SqlParams::new();
        let topic = params.bind(FieldValue::Int(3));
        assert_eq!(topic, "$p1");
        let predicate = SeekPredicate::build(hot_posts(), Some(hot(1, 1, 1, 1))).expect("seek");
        let sql = predicate.render(&mut params);
        assert!(
            sql.where_fragment
                .expect("fragment")
                .contains("score < $p2")
        );
        assert_eq!(params.len(), 5);
        let names: Vec<_> = params
            .into_bindings()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["p1", "p2", "p3", "p4", "p5"]);
    }

    #[test]
    fn admits_only_rows_strictly_after_boundary() {
        let tuple = hot_posts();
        let predicate = SeekPredicate::build(tuple, Some(hot(7, 0, 3, 3))).expect("seek");
        assert!(!predicate.admits(&hot(10, 2, 5, 5)));
        assert!(!predicate.admits(&hot(7, 0, 3, 3)));
        assert!(predicate.admits(&hot(7, 0, 3, 2)));
        assert!(predicate.admits(&hot(5, 1, 1, 1)));
    }

    #[test]
    fn admission_agrees_with_tuple_order() {
        let tuple = hot_posts();
        let rows = [
            hot(10, 2, 5, 5),
            hot(10, 2, 4, 4),
            hot(7, 0, 3, 3),
            hot(7, 0, 3, 2),
            hot(5, 1, 1, 1),
            hot(5, 0, 9, 0),
        ];
        for boundary in &rows {
            let predicate = SeekPredicate::build(tuple, Some(boundary.clone())).expect("seek");
            for row in &rows {
                assert_eq!(
                    predicate.admits(row),
                    tuple.compare(row, boundary) == Ordering::Greater
                );
            }
        }
    }

    #[test]
    fn rejects_boundary_with_wrong_arity() {
        let err = SeekPredicate::build(hot_posts(), Some(FieldValues::new(vec![])))
            .expect_err("arity mismatch");
        assert!(matches!(err, CursorError::SchemaMismatch(_)));
    }
}
