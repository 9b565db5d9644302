use rusqlite::types::Value;

/// How terms of a compiled filter combine. The v1 grammar allows one
/// combinator per expression, never a mix, and no parentheses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    pub fn is_ordering(&self) -> bool {
        !matches!(self, CompareOp::Eq)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterTerm {
    Compare {
        /// Canonical column name after alias normalization.
        column: String,
        op: CompareOp,
        value: FilterValue,
    },
    /// `keyword:<w>`: matches rows whose stored top-keyword JSON contains
    /// the `"<w>:"` prefix.
    Keyword(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterExpr {
    pub terms: Vec<FilterTerm>,
    pub combinator: Combinator,
}

#[derive(Clone, Debug)]
pub struct FilterError {
    pub message: String,
    pub suggested_actions: Vec<String>,
}

impl FilterError {
    fn new(message: impl Into<String>, suggested_actions: Vec<String>) -> Self {
        Self {
            message: message.into(),
            suggested_actions,
        }
    }
}

/// (public name, column, is boolean) tuples: the closed metadata field vocabulary.
const FIELDS: [(&str, &str, bool); 12] = [
    ("content_type", "content_type", false),
    ("content_subtype", "content_subtype", false),
    ("detection_confidence", "detection_confidence", false),
    ("has_abstract", "has_abstract", true),
    ("has_infobox", "has_infobox", true),
    ("has_toc", "has_toc", true),
    ("has_code", "has_code_examples", true),
    ("has_code_examples", "has_code_examples", true),
    ("section_count", "section_count", false),
    ("citation_count", "citation_count", false),
    ("code_block_count", "code_block_count", false),
    ("scheme", "scheme", false),
];

/// `domain` is the public name for the host column.
fn resolve_field(name: &str) -> Option<(&'static str, bool)> {
    let lower = name.to_ascii_lowercase();
    if lower == "domain" {
        return Some(("host", false));
    }
    FIELDS
        .iter()
        .find(|(public, _, _)| *public == lower)
        .map(|(_, column, boolean)| (*column, *boolean))
}

fn field_list() -> String {
    let mut names: Vec<&str> = FIELDS.iter().map(|(public, _, _)| *public).collect();
    names.push("domain");
    names.join(", ")
}

/// Parse a v1 metadata filter. Single-combinator boolean composition over
/// comparison terms, bare boolean fields, and `keyword:<w>` predicates.
pub fn parse(filter: &str) -> Result<FilterExpr, FilterError> {
    let filter = filter.trim();
    if filter.is_empty() {
        return Err(FilterError::new(
            "empty filter expression",
            vec![format!("provide a term over one of: {}", field_list())],
        ));
    }
    if filter.contains('(') || filter.contains(')') {
        return Err(FilterError::new(
            "parentheses are not supported in filter expressions",
            vec!["rewrite the filter as a flat AND-list or OR-list".to_string()],
        ));
    }

    let upper = filter.to_ascii_uppercase();
    let has_and = upper.split_whitespace().any(|w| w == "AND");
    let has_or = upper.split_whitespace().any(|w| w == "OR");
    if has_and && has_or {
        return Err(FilterError::new(
            "mixed AND/OR is not supported in one expression",
            vec!["split the filter into separate queries".to_string()],
        ));
    }
    let combinator = if has_or { Combinator::Or } else { Combinator::And };

    let raw_terms = split_terms(filter, if has_or { "or" } else { "and" });
    let mut terms = Vec::with_capacity(raw_terms.len());
    for raw in raw_terms {
        terms.push(parse_term(&raw)?);
    }
    if terms.is_empty() {
        return Err(FilterError::new(
            "no terms in filter expression",
            vec![format!("provide a term over one of: {}", field_list())],
        ));
    }

    Ok(FilterExpr { terms, combinator })
}

fn split_terms(filter: &str, keyword: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = Vec::new();
    for word in filter.split_whitespace() {
        if word.eq_ignore_ascii_case(keyword) {
            if !current.is_empty() {
                terms.push(current.join(" "));
                current = Vec::new();
            }
        } else {
            current.push(word);
        }
    }
    if !current.is_empty() {
        terms.push(current.join(" "));
    }
    terms
}

fn parse_term(raw: &str) -> Result<FilterTerm, FilterError> {
    let raw = raw.trim();

    if let Some(word) = raw.strip_prefix("keyword:") {
        let word = trim_quotes(word);
        if word.is_empty() {
            return Err(FilterError::new(
                "keyword: predicate requires a word",
                vec!["use keyword:<word>, e.g. keyword:neural".to_string()],
            ));
        }
        return Ok(FilterTerm::Keyword(word.to_string()));
    }

    // Longest operators first so ">=" never parses as ">".
    for (token, op) in [
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        ("!=", CompareOp::Ne),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        ("=", CompareOp::Eq),
    ] {
        if let Some(idx) = raw.find(token) {
            let field = raw[..idx].trim();
            let value = raw[idx + token.len()..].trim();
            return build_compare(field, op, value);
        }
    }

    // Bare field name: shorthand for `field = 1`, booleans only.
    let (column, boolean) = unknown_field_err(raw)?;
    if !boolean {
        return Err(FilterError::new(
            format!("field '{}' is not boolean and needs a comparison", raw),
            vec![format!("write {} = <value>", raw)],
        ));
    }
    Ok(FilterTerm::Compare {
        column: column.to_string(),
        op: CompareOp::Eq,
        value: FilterValue::Int(1),
    })
}

fn unknown_field_err(name: &str) -> Result<(&'static str, bool), FilterError> {
    resolve_field(name).ok_or_else(|| {
        FilterError::new(
            format!("unknown filter field '{}'", name),
            vec![
                format!("use one of: {}", field_list()),
                "or the keyword:<word> predicate".to_string(),
            ],
        )
    })
}

fn build_compare(field: &str, op: CompareOp, value: &str) -> Result<FilterTerm, FilterError> {
    let (column, boolean) = unknown_field_err(field)?;
    if value.is_empty() {
        return Err(FilterError::new(
            format!("missing value for field '{}'", field),
            vec![format!("write {} {} <value>", field, op.sql())],
        ));
    }

    let value = if boolean {
        match trim_quotes(value).to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => FilterValue::Int(1),
            "0" | "false" | "no" => FilterValue::Int(0),
            other => {
                return Err(FilterError::new(
                    format!("field '{}' is boolean, got '{}'", field, other),
                    vec![format!("write {} = true or {} = false", field, field)],
                ))
            }
        }
    } else if let Ok(i) = value.parse::<i64>() {
        FilterValue::Int(i)
    } else if let Ok(f) = value.parse::<f64>() {
        FilterValue::Float(f)
    } else {
        FilterValue::Text(trim_quotes(value).to_string())
    };

    Ok(FilterTerm::Compare {
        column: column.to_string(),
        op,
        value,
    })
}

fn trim_quotes(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(s)
}

/// Compile to a parameterized WHERE fragment over the `urls` table aliased
/// as `u`. Column names come from the whitelist, never from user input.
pub fn compile(expr: &FilterExpr) -> (String, Vec<Value>) {
    let mut fragments = Vec::with_capacity(expr.terms.len());
    let mut params: Vec<Value> = Vec::with_capacity(expr.terms.len());

    for term in &expr.terms {
        match term {
            FilterTerm::Compare { column, op, value } => {
                params.push(match value {
                    FilterValue::Int(i) => Value::Integer(*i),
                    FilterValue::Float(f) => Value::Real(*f),
                    FilterValue::Text(t) => Value::Text(t.clone()),
                });
                fragments.push(format!("u.{} {} ?{}", column, op.sql(), params.len()));
            }
            FilterTerm::Keyword(word) => {
                params.push(Value::Text(format!("%\"{}:%", word)));
                fragments.push(format!("u.top_keywords LIKE ?{}", params.len()));
            }
        }
    }

    let joiner = match expr.combinator {
        Combinator::And => " AND ",
        Combinator::Or => " OR ",
    };
    (fragments.join(joiner), params)
}

/// In-memory view of one page's filterable metadata, used by the inline
/// fetch filter. Mirrors the columns the SQL compilation targets.
#[derive(Clone, Debug, Default)]
pub struct FilterTarget {
    pub content_type: String,
    pub content_subtype: Option<String>,
    pub detection_confidence: f64,
    pub has_abstract: bool,
    pub has_infobox: bool,
    pub has_toc: bool,
    pub has_code_examples: bool,
    pub section_count: i64,
    pub citation_count: i64,
    pub code_block_count: i64,
    pub host: String,
    pub scheme: String,
    pub top_keywords: Vec<String>,
}

enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FilterTarget {
    fn scalar(&self, column: &str) -> Scalar {
        match column {
            "content_type" => Scalar::Text(self.content_type.clone()),
            "content_subtype" => Scalar::Text(self.content_subtype.clone().unwrap_or_default()),
            "detection_confidence" => Scalar::Float(self.detection_confidence),
            "has_abstract" => Scalar::Int(self.has_abstract as i64),
            "has_infobox" => Scalar::Int(self.has_infobox as i64),
            "has_toc" => Scalar::Int(self.has_toc as i64),
            "has_code_examples" => Scalar::Int(self.has_code_examples as i64),
            "section_count" => Scalar::Int(self.section_count),
            "citation_count" => Scalar::Int(self.citation_count),
            "code_block_count" => Scalar::Int(self.code_block_count),
            "host" => Scalar::Text(self.host.clone()),
            "scheme" => Scalar::Text(self.scheme.clone()),
            _ => Scalar::Text(String::new()),
        }
    }
}

/// Evaluate a parsed expression against in-memory metadata; same semantics
/// the SQL compilation produces against the URL row.
pub fn matches(expr: &FilterExpr, target: &FilterTarget) -> bool {
    let results = expr.terms.iter().map(|term| match term {
        FilterTerm::Compare { column, op, value } => {
            compare(&target.scalar(column), *op, value)
        }
        FilterTerm::Keyword(word) => {
            let prefix = format!("{}:", word);
            target.top_keywords.iter().any(|k| k.starts_with(&prefix))
        }
    });
    match expr.combinator {
        Combinator::And => results.into_iter().all(|r| r),
        Combinator::Or => results.into_iter().any(|r| r),
    }
}

fn compare(actual: &Scalar, op: CompareOp, expected: &FilterValue) -> bool {
    match (actual, expected) {
        (Scalar::Text(a), FilterValue::Text(e)) => match op {
            CompareOp::Eq => a == e,
            CompareOp::Ne => a != e,
            CompareOp::Gt => a > e,
            CompareOp::Ge => a >= e,
            CompareOp::Lt => a < e,
            CompareOp::Le => a <= e,
        },
        _ => {
            let a = match actual {
                Scalar::Int(i) => *i as f64,
                Scalar::Float(f) => *f,
                Scalar::Text(_) => return false,
            };
            let e = match expected {
                FilterValue::Int(i) => *i as f64,
                FilterValue::Float(f) => *f,
                FilterValue::Text(_) => return false,
            };
            match op {
                CompareOp::Eq => a == e,
                CompareOp::Ne => a != e,
                CompareOp::Gt => a > e,
                CompareOp::Ge => a >= e,
                CompareOp::Lt => a < e,
                CompareOp::Le => a <= e,
            }
        }
    }
}

/// Response confidence: mild penalties for ordering comparisons and for
/// boolean composition, floored at 0.6.
pub fn confidence(expr: &FilterExpr) -> f64 {
    let mut confidence: f64 = 0.95;
    for term in &expr.terms {
        if let FilterTerm::Compare { op, .. } = term {
            if op.is_ordering() {
                confidence -= 0.05;
            }
        }
    }
    if expr.terms.len() > 1 {
        confidence -= 0.05 * (expr.terms.len() - 1) as f64;
    }
    confidence.max(0.6)
}
