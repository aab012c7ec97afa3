//! Pure, driver-agnostic representation of the source schema's foreign-key
//! graph and the classification predicates the collector traverses by.
//!
//! Nothing in this module touches a database connection. [`SchemaGraph`] is
//! built once during introspection (see the `schema` crate) and is read-only
//! for the rest of a run.

use std::collections::{BTreeSet, HashMap, HashSet};

/// The kinds of constraint a column can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintType {
    PrimaryKey,
    ForeignKey,
    Unique,
}

/// One column of an introspected table.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ordinal_position: i32,
    /// Normalized data type; a source reporting `"ARRAY"` is rewritten to
    /// `"integer array"` by the introspection layer before this is built.
    pub data_type: String,
    pub constraint_types: HashSet<ConstraintType>,
    /// Referent table name, set only when `ForeignKey` is present.
    pub constraint_table: Option<String>,
}

impl Column {
    pub fn is_foreign_key(&self) -> bool {
        self.constraint_types.contains(&ConstraintType::ForeignKey)
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraint_types.contains(&ConstraintType::PrimaryKey)
    }

    pub fn is_unique(&self) -> bool {
        self.constraint_types.contains(&ConstraintType::Unique)
            || (self.is_foreign_key() && self.is_primary_key())
    }

    /// A column counts as "key scoped" when its own name was listed as a key
    /// column, or when it is a foreign key into the configured key table.
    fn is_key_column(&self, key_column_names: &[String], key_table_name: &str) -> bool {
        key_column_names.iter().any(|name| name == &self.name)
            || (self.is_foreign_key() && self.constraint_table.as_deref() == Some(key_table_name))
    }
}

/// One introspected table plus everything the collector needs to traverse
/// into and out of it.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    /// Ordered by ordinal position.
    pub columns: Vec<Column>,
    pub full_count: Option<u64>,
    pub max_pk: Option<i64>,
    /// Inverse of the FK edges: for every other table with a column
    /// referencing this one, the set of that table's referencing column
    /// names.
    pub revert_foreign_tables: HashMap<String, BTreeSet<String>>,
    pub is_checked: bool,
    pub is_ready_for_transferring: bool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            columns: Vec::new(),
            full_count: None,
            max_pk: None,
            revert_foreign_tables: HashMap::new(),
            is_checked: false,
            is_ready_for_transferring: false,
        }
    }

    /// The first non-`date` PRIMARY_KEY column, in ordinal order. Composite
    /// keys are unsupported; a `date`-typed PK is skipped to avoid the
    /// ambiguity a composite key would otherwise hide (see DESIGN.md).
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.is_primary_key() && c.data_type != "date")
    }

    /// True when a PRIMARY_KEY column exists but was skipped for being
    /// `date`-typed — useful for the warning the transporter logs.
    pub fn has_date_typed_primary_key(&self) -> bool {
        self.primary_key().is_none()
            && self
                .columns
                .iter()
                .any(|c| c.is_primary_key() && c.data_type == "date")
    }

    pub fn is_self_fk(&self, column: &Column) -> bool {
        column.is_foreign_key() && column.constraint_table.as_deref() == Some(self.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// The full FK graph for one run, plus the configuration that makes a table
/// or column "key scoped".
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    pub tables: HashMap<String, Table>,
    pub key_table_name: String,
    pub key_column_names: Vec<String>,
    pub excluded_tables: HashSet<String>,
    pub generic_fk_tables: HashSet<String>,
}

impl SchemaGraph {
    pub fn new(
        key_table_name: impl Into<String>,
        key_column_names: Vec<String>,
        excluded_tables: HashSet<String>,
        generic_fk_tables: HashSet<String>,
    ) -> Self {
        SchemaGraph {
            tables: HashMap::new(),
            key_table_name: key_table_name.into(),
            key_column_names,
            excluded_tables,
            generic_fk_tables,
        }
    }

    pub fn insert_table(&mut self, table: Table) {
        if self.excluded_tables.contains(&table.name) {
            return;
        }
        self.tables.insert(table.name.clone(), table);
    }

    /// Rebuilds every table's `revert_foreign_tables` from its forward FK
    /// columns. Idempotent; safe to call again after introspection appends
    /// more columns.
    ///
    /// Self-FK columns are included: a table that references itself needs
    /// to appear in its own reverse map, or the collector's reverse pull
    /// never closes a self-referencing hierarchy (§4.3, §8 Scenario 2).
    pub fn wire_reverse_edges(&mut self) {
        for table in self.tables.values_mut() {
            table.revert_foreign_tables.clear();
        }

        let edges: Vec<(String, String, String)> = self
            .tables
            .values()
            .flat_map(|table| {
                table
                    .columns
                    .iter()
                    .filter(|c| c.is_foreign_key())
                    .filter_map(|c| {
                        c.constraint_table
                            .clone()
                            .filter(|referent| self.tables.contains_key(referent))
                            .map(|referent| (referent, table.name.clone(), c.name.clone()))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for (referent, referencing_table, referencing_column) in edges {
            if let Some(referent_table) = self.tables.get_mut(&referent) {
                referent_table
                    .revert_foreign_tables
                    .entry(referencing_table)
                    .or_default()
                    .insert(referencing_column);
            }
        }
    }

    pub fn is_key_column(&self, column: &Column) -> bool {
        column.is_key_column(&self.key_column_names, &self.key_table_name)
    }

    pub fn with_key_column(&self, table: &Table) -> bool {
        table.columns.iter().any(|c| self.is_key_column(c))
    }

    /// Tables outside `TABLES_WITH_GENERIC_FOREIGN_KEY`: their FK targets are
    /// always a concrete, traversable table.
    pub fn tables_without_generics(&self) -> impl Iterator<Item = &Table> {
        self.tables
            .values()
            .filter(move |t| !self.generic_fk_tables.contains(&t.name))
    }

    pub fn tables_with_key_column(&self) -> Vec<&Table> {
        self.tables_without_generics()
            .filter(|t| self.with_key_column(t))
            .collect()
    }

    /// Non-self FK columns of `table` whose referent table itself
    /// `with_key_column`.
    pub fn fk_columns_with_key_column<'a>(&self, table: &'a Table) -> Vec<&'a Column> {
        table
            .columns
            .iter()
            .filter(|c| c.is_foreign_key() && !table.is_self_fk(c))
            .filter(|c| {
                c.constraint_table
                    .as_deref()
                    .and_then(|name| self.tables.get(name))
                    .map(|referent| self.with_key_column(referent))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn unique_fk_columns_with_key_column<'a>(&self, table: &'a Table) -> Vec<&'a Column> {
        self.fk_columns_with_key_column(table)
            .into_iter()
            .filter(|c| c.is_unique())
            .collect()
    }

    /// Non-self FK columns of `table` whose referent has at least one FK
    /// column itself reaching a `with_key_column` table (two-hop
    /// reachability).
    pub fn fk_columns_tables_with_fk_columns_with_key_column<'a>(&self, table: &'a Table) -> Vec<&'a Column> {
        table
            .columns
            .iter()
            .filter(|c| c.is_foreign_key() && !table.is_self_fk(c))
            .filter(|c| {
                c.constraint_table
                    .as_deref()
                    .and_then(|name| self.tables.get(name))
                    .map(|referent| !self.fk_columns_with_key_column(referent).is_empty())
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn unique_fk_columns_tables_with_fk_columns_with_key_column<'a>(
        &self,
        table: &'a Table,
    ) -> Vec<&'a Column> {
        self.fk_columns_tables_with_fk_columns_with_key_column(table)
            .into_iter()
            .filter(|c| c.is_unique())
            .collect()
    }

    /// Selects the most restrictive FK edge(s) to use for the collector's
    /// forward-pull query: the first non-empty of unique+direct,
    /// (unique+two-hop ∪ direct), direct+two-hop, all non-self FKs.
    pub fn highest_priority_fk_columns<'a>(&self, table: &'a Table) -> Vec<&'a Column> {
        let unique_direct = self.unique_fk_columns_with_key_column(table);
        if !unique_direct.is_empty() {
            return unique_direct;
        }

        let unique_two_hop = self.unique_fk_columns_tables_with_fk_columns_with_key_column(table);
        let direct = self.fk_columns_with_key_column(table);
        let combo = union_by_name(&unique_two_hop, &direct);
        if !combo.is_empty() {
            return combo;
        }

        let two_hop = self.fk_columns_tables_with_fk_columns_with_key_column(table);
        let direct_two_hop = union_by_name(&direct, &two_hop);
        if !direct_two_hop.is_empty() {
            return direct_two_hop;
        }

        table
            .columns
            .iter()
            .filter(|c| c.is_foreign_key() && !table.is_self_fk(c))
            .collect()
    }
}

fn union_by_name<'a>(a: &[&'a Column], b: &[&'a Column]) -> Vec<&'a Column> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for col in a.iter().chain(b.iter()) {
        if seen.insert(col.name.as_str()) {
            out.push(*col);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk_column(name: &str, referent: &str) -> Column {
        let mut types = HashSet::new();
        types.insert(ConstraintType::ForeignKey);
        Column {
            name: name.to_string(),
            ordinal_position: 1,
            data_type: "integer".to_string(),
            constraint_types: types,
            constraint_table: Some(referent.to_string()),
        }
    }

    fn pk_column(name: &str) -> Column {
        let mut types = HashSet::new();
        types.insert(ConstraintType::PrimaryKey);
        Column {
            name: name.to_string(),
            ordinal_position: 0,
            data_type: "integer".to_string(),
            constraint_types: types,
            constraint_table: None,
        }
    }

    fn graph_with_chain() -> SchemaGraph {
        // key(id) <- a(id, key_id FK key) <- b(id, a_id FK a) <- c(id, b_id FK b)
        // `a` is with_key_column directly (key_id's referent name matches the
        // key table); `b` is only reachable through `a` (one hop); `c` only
        // through `b` (two hops).
        let mut graph = SchemaGraph::new(
            "key",
            vec!["key_id".to_string()],
            HashSet::new(),
            HashSet::new(),
        );

        let mut key = Table::new("key");
        key.columns.push(pk_column("id"));
        graph.insert_table(key);

        let mut a = Table::new("a");
        a.columns.push(pk_column("id"));
        a.columns.push(fk_column("key_id", "key"));
        graph.insert_table(a);

        let mut b = Table::new("b");
        b.columns.push(pk_column("id"));
        b.columns.push(fk_column("a_id", "a"));
        graph.insert_table(b);

        let mut c = Table::new("c");
        c.columns.push(pk_column("id"));
        c.columns.push(fk_column("b_id", "b"));
        graph.insert_table(c);

        graph.wire_reverse_edges();
        graph
    }

    #[test]
    fn reverse_edges_are_the_inverse_of_forward_fks() {
        let graph = graph_with_chain();
        let key = &graph.tables["key"];
        assert!(key.revert_foreign_tables["a"].contains("key_id"));

        let a = &graph.tables["a"];
        assert!(a.revert_foreign_tables["b"].contains("a_id"));
    }

    #[test]
    fn with_key_column_detects_direct_and_misses_unrelated() {
        let graph = graph_with_chain();
        assert!(graph.with_key_column(&graph.tables["a"]));
        assert!(!graph.with_key_column(&graph.tables["b"]));
    }

    #[test]
    fn one_hop_reachability_finds_b_via_a() {
        let graph = graph_with_chain();
        let b = &graph.tables["b"];
        let direct = graph.fk_columns_with_key_column(b);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].name, "a_id");
    }

    #[test]
    fn two_hop_reachability_finds_c_via_b() {
        let graph = graph_with_chain();
        let c = &graph.tables["c"];

        // `c` has no direct one-hop path: `b` is not itself with_key_column.
        assert!(graph.fk_columns_with_key_column(c).is_empty());

        let two_hop = graph.fk_columns_tables_with_fk_columns_with_key_column(c);
        assert_eq!(two_hop.len(), 1);
        assert_eq!(two_hop[0].name, "b_id");
    }

    #[test]
    fn highest_priority_prefers_unique_direct_over_everything() {
        let graph = graph_with_chain();

        let mut t = Table::new("t");
        t.columns.push(pk_column("id"));
        let mut unique_fk = fk_column("a_id", "a");
        unique_fk.constraint_types.insert(ConstraintType::Unique);
        t.columns.push(unique_fk);
        t.columns.push(fk_column("other_a_id", "a"));

        let mut graph = graph;
        graph.insert_table(t);
        graph.wire_reverse_edges();

        let chosen = graph.highest_priority_fk_columns(&graph.tables["t"]);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].name, "a_id");
    }

    #[test]
    fn highest_priority_falls_back_to_all_fks_when_nothing_reaches_key_scope() {
        let mut graph = SchemaGraph::new(
            "key",
            vec!["key_id".to_string()],
            HashSet::new(),
            HashSet::new(),
        );
        let mut key = Table::new("key");
        key.columns.push(pk_column("id"));
        graph.insert_table(key);

        let mut t = Table::new("t");
        t.columns.push(pk_column("id"));
        t.columns.push(fk_column("key_id", "key"));
        t.columns.push(fk_column("other_key_id", "key"));
        graph.insert_table(t);
        graph.wire_reverse_edges();

        // Neither column's referent (the key table itself) is with_key_column,
        // so every tier is empty and both FKs fall through to the catch-all.
        let chosen = graph.highest_priority_fk_columns(&graph.tables["t"]);
        assert_eq!(chosen.len(), 2);
    }

    #[test]
    fn self_fk_never_selected_for_traversal() {
        let mut graph = SchemaGraph::new(
            "key",
            vec!["key_id".to_string()],
            HashSet::new(),
            HashSet::new(),
        );
        let mut key = Table::new("key");
        key.columns.push(pk_column("id"));
        graph.insert_table(key);

        let mut org = Table::new("org");
        org.columns.push(pk_column("id"));
        org.columns.push(fk_column("parent_id", "org"));
        org.columns.push(fk_column("key_id", "key"));
        graph.insert_table(org);
        graph.wire_reverse_edges();

        let org_table = &graph.tables["org"];
        assert!(org_table.is_self_fk(org_table.column("parent_id").unwrap()));
        let priority = graph.highest_priority_fk_columns(org_table);
        assert!(priority.iter().all(|c| c.name != "parent_id"));
    }

    #[test]
    fn self_fk_columns_still_appear_in_their_own_reverse_map() {
        let mut graph = SchemaGraph::new(
            "key",
            vec!["key_id".to_string()],
            HashSet::new(),
            HashSet::new(),
        );
        let mut key = Table::new("key");
        key.columns.push(pk_column("id"));
        graph.insert_table(key);

        let mut org = Table::new("org");
        org.columns.push(pk_column("id"));
        org.columns.push(fk_column("parent_id", "org"));
        org.columns.push(fk_column("key_id", "key"));
        graph.insert_table(org);
        graph.wire_reverse_edges();

        // `org` must reverse-pull against itself, or a descendant reachable
        // only through `parent_id` is never collected.
        let org_table = &graph.tables["org"];
        assert!(org_table.revert_foreign_tables["org"].contains("parent_id"));
    }

    #[test]
    fn date_typed_primary_key_is_skipped_not_selected() {
        let mut t = Table::new("t");
        let mut types = HashSet::new();
        types.insert(ConstraintType::PrimaryKey);
        t.columns.push(Column {
            name: "as_of".to_string(),
            ordinal_position: 0,
            data_type: "date".to_string(),
            constraint_types: types,
            constraint_table: None,
        });
        assert!(t.primary_key().is_none());
        assert!(t.has_date_typed_primary_key());
    }
}
