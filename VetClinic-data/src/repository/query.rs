use rusqlite::types::Value;

use crate::models::BranchScope;

/// WHERE clause builder for listings with optional filters
#[derive(Debug, Default)]
pub(crate) struct Conditions {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clause using `?` placeholders, one per value
    pub fn push(&mut self, clause: &str, values: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.to_string());
        self.params.extend(values);
    }

    pub fn push_opt<T: Into<Value>>(&mut self, clause: &str, value: Option<T>) {
        if let Some(value) = value {
            self.push(clause, [value.into()]);
        }
    }

    /// Restrict `column` to the branches visible in `scope`
    pub fn scope(&mut self, column: &str, scope: BranchScope) {
        match scope {
            BranchScope::All => {}
            BranchScope::Branch(id) => self.push(&format!("{} = ?", column), [Value::Integer(id)]),
            BranchScope::Nothing => self.push("0 = 1", []),
        }
    }

    /// Case-insensitive substring match over any of `columns`. The term is
    /// matched literally: LIKE wildcards in it are escaped.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) {
        let term = match term.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_lowercase(),
            _ => return,
        };
        let pattern = format!("%{}%", escape_like(&term));
        let clause = columns
            .iter()
            .map(|c| format!("lower({}) LIKE ? ESCAPE '\\'", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.push(
            &format!("({})", clause),
            columns.iter().map(|_| Value::Text(pattern.clone())),
        );
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_conditions() {
        let conds = Conditions::new();
        assert_eq!(conds.where_sql(), "");
        assert!(conds.params().is_empty());
    }

    #[test]
    fn test_scope_and_search() {
        let mut conds = Conditions::new();
        conds.scope("a.branch_id", BranchScope::Branch(3));
        conds.search(&["p.name", "a.notes"], Some("  Luna "));
        conds.search(&["p.name"], Some("   "));

        assert_eq!(
            conds.where_sql(),
            " WHERE a.branch_id = ? AND (lower(p.name) LIKE ? ESCAPE '\\' OR lower(a.notes) LIKE ? ESCAPE '\\')"
        );
        assert_eq!(conds.params().len(), 3);
        assert_eq!(conds.params()[1], Value::Text("%luna%".to_string()));
    }

    #[test]
    fn test_search_escapes_wildcards() {
        let mut conds = Conditions::new();
        conds.search(&["name"], Some(r"50%_off\x"));
        assert_eq!(conds.params()[0], Value::Text(r"%50\%\_off\\x%".to_string()));
    }

    #[test]
    fn test_nothing_scope_matches_no_rows() {
        let mut conds = Conditions::new();
        conds.scope("branch_id", BranchScope::Nothing);
        assert_eq!(conds.where_sql(), " WHERE 0 = 1");
    }
}
