//! Procedure data loading
//!
//! Reads the entity / relationship tables that make up the procedure graph
//! and the procedure rule table. Rows that cannot be interpreted are dropped
//! with a warning; only structural problems (missing header or required
//! column, unreadable file) are errors.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::LoadError;
use crate::procedure::graph::{EdgeLabel, GroupKey, NodeKind, ProcedureEdge, ProcedureGraph, ProcedureNode};
use crate::procedure::rules::{ProcedureRule, RuleBook, RuleTrigger, RuleUpdate, ScenarioFilter};

const BUILTIN_ENTITIES: &str = include_str!("../data/entity.csv");
const BUILTIN_RELATIONSHIPS: &str = include_str!("../data/relationship.csv");
const BUILTIN_RULES: &str = include_str!("../data/procedure_rules.csv");

/// Status value that ends the training session
const STATUS_END: &str = "end";

/// Split one CSV record, honouring double quotes and `""` escapes.
pub fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

struct Table {
    name: &'static str,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn parse(name: &'static str, text: &str) -> Result<Self, LoadError> {
        let mut lines = text
            .lines()
            .map(|line| line.trim_start_matches('\u{feff}'))
            .filter(|line| !line.trim().is_empty());
        let header = lines.next().map(split_record).ok_or(LoadError::EmptyTable { table: name })?;
        let rows = lines.map(split_record).collect();
        Ok(Self { name, header, rows })
    }

    fn column(&self, column: &'static str) -> Result<usize, LoadError> {
        self.optional_column(column)
            .ok_or(LoadError::MissingColumn { table: self.name, column })
    }

    fn optional_column(&self, column: &str) -> Option<usize> {
        self.header.iter().position(|h| h.eq_ignore_ascii_case(column))
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Build the procedure graph from entity and relationship CSV text.
pub fn parse_graph(entity_csv: &str, relationship_csv: &str) -> Result<ProcedureGraph, LoadError> {
    let entities = Table::parse("entity", entity_csv)?;
    let id_col = entities.column("entity_id")?;
    let name_col = entities.column("entity_name")?;
    let type_col = entities.column("entity_type")?;
    let value_col = entities.optional_column("value");

    let mut nodes = Vec::with_capacity(entities.rows.len());
    for row in &entities.rows {
        let id = cell(row, id_col);
        if id.is_empty() {
            warn!("[loader] Skipping entity row without an id");
            continue;
        }
        let Some(kind) = NodeKind::from_code(cell(row, type_col)) else {
            warn!("[loader] Skipping entity {} with unknown type '{}'", id, cell(row, type_col));
            continue;
        };
        let mut node = ProcedureNode::new(id, kind, cell(row, name_col));
        node.value = value_col
            .map(|col| cell(row, col))
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        nodes.push(node);
    }

    let relationships = Table::parse("relationship", relationship_csv)?;
    let src_col = relationships.column("src_id")?;
    let dst_col = relationships.column("dst_id")?;
    let label_col = relationships.column("edge_name")?;
    let group_col = relationships.optional_column("class_num");

    let edges: Vec<ProcedureEdge> = relationships
        .rows
        .iter()
        .filter(|row| !cell(row, src_col).is_empty() && !cell(row, dst_col).is_empty())
        .map(|row| ProcedureEdge {
            source: cell(row, src_col).into(),
            target: cell(row, dst_col).into(),
            label: EdgeLabel::parse(cell(row, label_col)),
            group: group_col
                .map(|col| cell(row, col))
                .filter(|group| !group.is_empty())
                .map(GroupKey::from),
        })
        .collect();

    let graph = ProcedureGraph::from_parts(nodes, edges);
    info!(
        "[loader] Loaded procedure graph: {} nodes, {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// Parse the procedure rule table (`after_action,scenario,status,<key>...`).
pub fn parse_rules(rules_csv: &str) -> Result<RuleBook, LoadError> {
    let table = Table::parse("procedure rule", rules_csv)?;
    let trigger_col = table.column("after_action")?;
    let scenario_col = table.column("scenario")?;
    let status_col = table.optional_column("status");

    let update_cols: Vec<usize> = (0..table.header.len())
        .filter(|&col| col != trigger_col && col != scenario_col && Some(col) != status_col)
        .collect();

    let mut rules = Vec::new();
    for row in &table.rows {
        let trigger = cell(row, trigger_col);
        if trigger.is_empty() {
            continue;
        }
        if row.len() > table.header.len() {
            warn!("[loader] Skipping rule row for '{}': more cells than header columns", trigger);
            continue;
        }

        let scenario_code = cell(row, scenario_col);
        let scenario = if scenario_code.is_empty() {
            ScenarioFilter::All
        } else if let Some(filter) = ScenarioFilter::parse(scenario_code) {
            filter
        } else {
            warn!("[loader] Skipping rule for '{}': unknown scenario '{}'", trigger, scenario_code);
            continue;
        };

        let ends_session = status_col
            .map(|col| cell(row, col).eq_ignore_ascii_case(STATUS_END))
            .unwrap_or(false);

        let mut updates = Vec::new();
        for &col in &update_cols {
            let value = cell(row, col);
            if value.is_empty() {
                continue;
            }
            let key = &table.header[col];
            match RuleUpdate::parse(key, value) {
                Some(update) => updates.push(update),
                None => warn!("[loader] Dropping rule cell {}={} for '{}'", key, value, trigger),
            }
        }

        rules.push(ProcedureRule {
            trigger: RuleTrigger::parse(trigger),
            scenario,
            ends_session,
            updates,
        });
    }

    info!("[loader] Loaded {} procedure rules", rules.len());
    Ok(RuleBook::new(rules))
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|e| LoadError::io(path, e))
}

pub fn load_graph(entities: &Path, relationships: &Path) -> Result<ProcedureGraph, LoadError> {
    parse_graph(&read(entities)?, &read(relationships)?)
}

pub fn load_rules(path: &Path) -> Result<RuleBook, LoadError> {
    parse_rules(&read(path)?)
}

/// Feedwater-loss procedure shipped with the crate.
pub fn builtin_graph() -> Result<ProcedureGraph, LoadError> {
    parse_graph(BUILTIN_ENTITIES, BUILTIN_RELATIONSHIPS)
}

pub fn builtin_rules() -> Result<RuleBook, LoadError> {
    parse_rules(BUILTIN_RULES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::{Command, PlantVariable};
    use crate::procedure::graph::NodeId;
    use crate::scenario::Scenario;

    #[test]
    fn quoted_fields_keep_commas() {
        assert_eq!(
            split_record(r#"ic_1,"Flow, main ""A""",IC"#),
            vec!["ic_1", r#"Flow, main "A""#, "IC"]
        );
        assert_eq!(split_record("a,,c"), vec!["a", "", "c"]);
    }

    #[test]
    fn graph_tables_parse_with_groups_and_values() {
        let entities = "entity_id,entity_name,entity_type,value\n\
                        s1,STEP1,PC_ST,\n\
                        ic1,Level,IC,\n\
                        ft1,\"45 %\",PC_FT,45\n\
                        x1,Mystery,ZZ,\n";
        let relationships = "src_id,dst_id,edge_name,edge_type,class_num\n\
                             s1,ic1,check_if,action,g1\n\
                             ic1,ft1,is_below_than,relationship,g1\n\
                             s1,x1,next,others,\n";
        let graph = parse_graph(entities, relationships).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        let ft = graph.node(&NodeId::from("ft1")).unwrap();
        assert_eq!(ft.name, "45 %");
        assert_eq!(ft.value.as_deref(), Some("45"));
        let check = &graph.edges()[0];
        assert_eq!(check.label, EdgeLabel::CheckIf);
        assert_eq!(check.group, Some(GroupKey::from("g1")));
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let result = parse_graph("entity_id,entity_type\ns1,PC_ST\n", "src_id,dst_id,edge_name\n");
        assert!(matches!(
            result,
            Err(LoadError::MissingColumn { table: "entity", column: "entity_name" })
        ));
        assert!(matches!(parse_rules("\n\n"), Err(LoadError::EmptyTable { .. })));
    }

    #[test]
    fn rule_rows_become_typed_rules() {
        let csv = "after_action,scenario,status,fw_pump_trip,fw_low_flow,core_t\n\
                   5sec,B,,TRUE,,\n\
                   4_5,C,,,TRUE,_250\n\
                   5_1,all,end,,,\n\
                   4_9,Q,,,,\n";
        let book = parse_rules(csv).unwrap();
        assert_eq!(book.len(), 3);

        let onset = &book.rules()[0];
        assert_eq!(onset.trigger, RuleTrigger::FaultOnset);
        assert_eq!(onset.scenario, ScenarioFilter::Only(Scenario::PumpTrip));
        assert_eq!(
            onset.updates,
            vec![RuleUpdate::Assign { command: Command::FeedwaterPump, value: false }]
        );

        let cool = &book.rules()[1];
        assert_eq!(
            cool.updates,
            vec![RuleUpdate::Transition { variable: PlantVariable::CoreTemp, target: 250.0, duration: 5.0 }]
        );
        assert!(book.rules()[2].ends_session);
    }

    #[test]
    fn builtin_procedure_loads() {
        let graph = builtin_graph().unwrap();
        let rules = builtin_rules().unwrap();
        assert_eq!(graph.first_step(), Some(&NodeId::from("pc_st_01_01")));
        assert!(!rules.is_empty());
    }
}
