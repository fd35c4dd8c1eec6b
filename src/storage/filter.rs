// ============================================================================
// src/storage/filter.rs - Filter evaluation for the in-memory backend
// ============================================================================
//
// Covers the subset of the store's query semantics exercised by model code:
// equality (with dotted paths and array membership), comparison operators,
// $in/$nin, $exists and the $and/$or/$nor combinators, plus sort, skip,
// limit and top-level projection from FindOptions.
//
// ============================================================================

use std::cmp::Ordering;

use bson::{Bson, Document};
use mongodb::options::FindOptions;

use crate::core::{AdapterError, Result};

// ============================================================================
// MATCHING
// ============================================================================

/// Returns true when `document` satisfies every clause of `filter`.
pub(crate) fn matches(document: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(document, key, condition)?,
            "$nor" => !any_clause(document, key, condition)?,
            other if other.starts_with('$') => {
                return Err(unsupported(format!("top-level operator {}", other)));
            }
            path => field_matches(lookup(document, path), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn any_clause(document: &Document, op: &str, condition: &Bson) -> Result<bool> {
    for clause in clauses(op, condition)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>> {
    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Bson::Document(clause) => Ok(clause),
                _ => Err(unsupported(format!("{} entries must be documents", op))),
            })
            .collect(),
        _ => Err(unsupported(format!("{} requires a non-empty array", op))),
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(operators) => {
            for (op, operand) in operators {
                if !operator_matches(value, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals_or_contains(value, condition)),
    }
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn operator_matches(value: Option<&Bson>, op: &str, operand: &Bson) -> Result<bool> {
    let satisfied = match op {
        "$eq" => equals_or_contains(value, operand),
        "$ne" => !equals_or_contains(value, operand),
        "$gt" => ordered(value, operand, |o| o == Ordering::Greater),
        "$gte" => ordered(value, operand, |o| o != Ordering::Less),
        "$lt" => ordered(value, operand, |o| o == Ordering::Less),
        "$lte" => ordered(value, operand, |o| o != Ordering::Greater),
        "$in" => in_list(value, op, operand)?,
        "$nin" => !in_list(value, op, operand)?,
        "$exists" => value.is_some() == truthy(operand),
        other => return Err(unsupported(format!("query operator {}", other))),
    };
    Ok(satisfied)
}

fn in_list(value: Option<&Bson>, op: &str, operand: &Bson) -> Result<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates
            .iter()
            .any(|candidate| equals_or_contains(value, candidate))),
        _ => Err(unsupported(format!("{} requires an array", op))),
    }
}

/// Equality the way the store applies it: a missing field equals null, and an
/// array field matches when any element does.
fn equals_or_contains(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(actual) => values_equal(actual, expected),
    }
}

fn ordered(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|actual| compare_values(actual, operand))
        .is_some_and(accept)
}

pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    compare_values(a, b) == Some(Ordering::Equal) || a == b
}

/// Compares two values of the same kind. Numbers compare across widths.
fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            Some(x.timestamp_millis().cmp(&y.timestamp_millis()))
        }
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => as_number(other).is_none_or(|n| n != 0.0),
    }
}

/// Resolves a dotted path through embedded documents.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

// ============================================================================
// FIND OPTIONS
// ============================================================================

/// Applies sort, skip, limit and projection, in that order.
pub(crate) fn apply_find_options(
    mut documents: Vec<Document>,
    options: Option<&FindOptions>,
) -> Result<Vec<Document>> {
    let Some(options) = options else {
        return Ok(documents);
    };

    if let Some(sort) = &options.sort {
        sort_documents(&mut documents, sort)?;
    }

    let skip = options.skip.unwrap_or(0) as usize;
    // A negative limit means "single batch of |n|" to the server; the count is the same.
    let limit = options
        .limit
        .map(|limit| limit.unsigned_abs() as usize)
        .filter(|limit| *limit > 0)
        .unwrap_or(usize::MAX);

    let window = documents.into_iter().skip(skip).take(limit);

    Ok(match &options.projection {
        Some(projection) => window.map(|doc| project(doc, projection)).collect(),
        None => window.collect(),
    })
}

fn sort_documents(documents: &mut [Document], sort: &Document) -> Result<()> {
    let mut keys = Vec::with_capacity(sort.len());
    for (path, direction) in sort {
        let descending = match as_number(direction) {
            Some(d) if d == 1.0 => false,
            Some(d) if d == -1.0 => true,
            _ => return Err(unsupported(format!("sort direction for '{}'", path))),
        };
        keys.push((path.as_str(), descending));
    }

    documents.sort_by(|a, b| {
        for (path, descending) in &keys {
            let ordering = sort_order(lookup(a, path), lookup(b, path));
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(())
}

/// Total order across kinds: missing/null, numbers, strings, documents,
/// arrays, binary, object ids, booleans, dates, everything else.
fn sort_order(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 0,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 1,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::Binary(_)) => 5,
        Some(Bson::ObjectId(_)) => 6,
        Some(Bson::Boolean(_)) => 7,
        Some(Bson::DateTime(_)) | Some(Bson::Timestamp(_)) => 8,
        Some(_) => 9,
    }
}

fn project(document: Document, projection: &Document) -> Document {
    let keep_id = projection.get("_id").is_none_or(truthy);
    let inclusive = projection
        .iter()
        .any(|(key, value)| key != "_id" && truthy(value));

    if inclusive {
        document
            .into_iter()
            .filter(|(key, _)| {
                if key == "_id" {
                    keep_id
                } else {
                    projection.get(key).is_some_and(truthy)
                }
            })
            .collect()
    } else {
        document
            .into_iter()
            .filter(|(key, _)| {
                if key == "_id" {
                    keep_id
                } else {
                    projection.get(key).is_none_or(truthy)
                }
            })
            .collect()
    }
}

fn unsupported(what: String) -> AdapterError {
    AdapterError::UnsupportedOperation(what)
}
