//! Dependency extraction, cross-sheet cycle detection, and topological
//! ordering for whole-workbook evaluation (§4.7).

use rustc_hash::{FxHashMap, FxHashSet};

use formulon_common::{QualifiedRef, SheetName};
use formulon_parse::Expr;

use crate::error::CycleError;
use crate::traits::Workbook;

/// Every cell an expression reads, with `RangeRef`s expanded to their
/// constituent cells. Ranges spanning a full column/row are expanded against
/// `home_sheet`'s current extent (the caller already knows the sheet the
/// formula lives in); a full span with no bound beyond `u32::MAX` would
/// otherwise enumerate billions of cells, so callers must bound it first via
/// `sheet.used_range()` before calling this on a full-column `CellRange`.
pub fn extract_dependencies(expr: &Expr, home_sheet: &str) -> FxHashSet<QualifiedRef> {
    let mut out = FxHashSet::default();
    walk(expr, home_sheet, &mut out);
    out
}

fn walk(expr: &Expr, home_sheet: &str, out: &mut FxHashSet<QualifiedRef>) {
    match expr {
        Expr::Ref(at, ..) => {
            out.insert(QualifiedRef::new(home_sheet, *at));
        }
        Expr::SheetRef(sheet, at, ..) => {
            out.insert(QualifiedRef::new(sheet.clone(), *at));
        }
        Expr::RangeRef(range) => {
            for at in range.iter() {
                out.insert(QualifiedRef::new(home_sheet, at));
            }
        }
        Expr::SheetRangeRef(sheet, range) => {
            for at in range.iter() {
                out.insert(QualifiedRef::new(sheet.clone(), at));
            }
        }
        Expr::Add(l, r)
        | Expr::Sub(l, r)
        | Expr::Mul(l, r)
        | Expr::Div(l, r)
        | Expr::Pow(l, r)
        | Expr::Lt(l, r)
        | Expr::Lte(l, r)
        | Expr::Gt(l, r)
        | Expr::Gte(l, r)
        | Expr::Eq(l, r)
        | Expr::Neq(l, r)
        | Expr::And(l, r)
        | Expr::Or(l, r)
        | Expr::Concat(l, r) => {
            walk(l, home_sheet, out);
            walk(r, home_sheet, out);
        }
        Expr::Neg(e) | Expr::Percent(e) | Expr::Not(e) => walk(e, home_sheet, out),
        Expr::If(cond, then, els) => {
            walk(cond, home_sheet, out);
            walk(then, home_sheet, out);
            if let Some(e) = els {
                walk(e, home_sheet, out);
            }
        }
        Expr::Array(rows) => {
            for row in rows {
                for cell in row {
                    walk(cell, home_sheet, out);
                }
            }
        }
        Expr::Call(_, args) => {
            for a in args {
                walk(a, home_sheet, out);
            }
        }
        Expr::Number(_) | Expr::Bool(_) | Expr::Text(_) | Expr::Date(_) | Expr::DateTime(_) | Expr::Error(_) => {}
        Expr::PolyRef(..) | Expr::PolySheetRef(..) => {
            unreachable!("PolyRef must be resolved by formulon_parse::resolve_types before dependency extraction")
        }
    }
}

pub type DependencyGraph = FxHashMap<QualifiedRef, FxHashSet<QualifiedRef>>;

/// Enumerate every `Formula` cell in every sheet and record its dependencies,
/// qualified by the sheet the formula itself lives in (§4.7).
pub fn build_workbook_graph(workbook: &dyn Workbook) -> DependencyGraph {
    let mut graph = DependencyGraph::default();
    for sheet_name in workbook.sheet_names() {
        let sheet = match workbook.sheet(sheet_name) {
            Some(s) => s,
            None => continue,
        };
        for (at, value) in sheet.iter_non_empty() {
            if let formulon_common::CellValue::Formula(src, _) = value {
                let node = QualifiedRef::new(sheet_name.to_string(), at);
                let deps = match parse_for_dependencies(&src) {
                    Ok(expr) => extract_dependencies(&expr, sheet_name),
                    Err(_) => FxHashSet::default(),
                };
                graph.entry(node).or_default().extend(deps);
            }
        }
    }
    graph
}

fn parse_for_dependencies(src: &str) -> Result<Expr, formulon_parse::ParseError> {
    let text = src.strip_prefix('=').unwrap_or(src);
    formulon_parse::parse(&format!("={text}"))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// DFS with a visiting stack (§4.7): a back-edge into a node still `Visiting`
/// is a cycle; `CycleError` reports the participating nodes in cycle order.
pub fn detect_cycles(graph: &DependencyGraph) -> Result<(), CycleError> {
    let mut marks: FxHashMap<&QualifiedRef, Mark> = FxHashMap::default();
    let mut stack: Vec<QualifiedRef> = Vec::new();

    for start in graph.keys() {
        if marks.contains_key(start) {
            continue;
        }
        if let Some(trace) = dfs(start, graph, &mut marks, &mut stack) {
            return Err(CycleError { trace });
        }
    }
    Ok(())
}

fn dfs<'a>(
    node: &'a QualifiedRef,
    graph: &'a DependencyGraph,
    marks: &mut FxHashMap<&'a QualifiedRef, Mark>,
    stack: &mut Vec<QualifiedRef>,
) -> Option<Vec<QualifiedRef>> {
    marks.insert(node, Mark::Visiting);
    stack.push(node.clone());

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            match marks.get(dep) {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| n == dep).unwrap_or(0);
                    let mut trace = stack[start..].to_vec();
                    trace.push(dep.clone());
                    return Some(trace);
                }
                Some(Mark::Done) => continue,
                None => {
                    if let Some(trace) = dfs(dep, graph, marks, stack) {
                        return Some(trace);
                    }
                }
            }
        }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    None
}

/// Kahn's algorithm (§4.7): nodes nothing depends on come first, terminal
/// formulas last. Ties broken by `(sheet, row, col)` lexicographic order
/// (§5) so whole-sheet evaluation is deterministic across runs.
pub fn topo_order(graph: &DependencyGraph) -> Vec<QualifiedRef> {
    let mut in_degree: FxHashMap<QualifiedRef, usize> = FxHashMap::default();
    let mut dependents: FxHashMap<QualifiedRef, Vec<QualifiedRef>> = FxHashMap::default();

    let mut all_nodes: FxHashSet<QualifiedRef> = FxHashSet::default();
    for (node, deps) in graph {
        all_nodes.insert(node.clone());
        all_nodes.extend(deps.iter().cloned());
    }
    for node in &all_nodes {
        in_degree.entry(node.clone()).or_insert(0);
    }
    for (node, deps) in graph {
        for dep in deps {
            *in_degree.entry(node.clone()).or_insert(0) += 1;
            dependents.entry(dep.clone()).or_default().push(node.clone());
        }
    }

    let mut ready: Vec<QualifiedRef> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(n, _)| n.clone()).collect();
    ready.sort_by(sheet_row_col_order);

    let mut order = Vec::with_capacity(all_nodes.len());
    let mut frontier = ready;
    while let Some(node) = frontier.pop() {
        order.push(node.clone());
        if let Some(deps) = dependents.get(&node) {
            let mut newly_ready = Vec::new();
            for dependent in deps {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        newly_ready.push(dependent.clone());
                    }
                }
            }
            newly_ready.sort_by(sheet_row_col_order);
            frontier.extend(newly_ready);
            frontier.sort_by(|a, b| sheet_row_col_order(b, a));
        }
    }
    order
}

fn sheet_row_col_order(a: &QualifiedRef, b: &QualifiedRef) -> std::cmp::Ordering {
    (&a.sheet, a.cell.row, a.cell.col).cmp(&(&b.sheet, b.cell.row, b.cell.col))
}

#[cfg(test)]
mod tests {
    use super::*;
    use formulon_common::ARef;

    fn qr(sheet: &str, col1: u32, row1: u32) -> QualifiedRef {
        QualifiedRef::new(sheet, ARef::from_excel(col1, row1))
    }

    #[test]
    fn topo_order_places_leaves_before_dependents() {
        let mut graph = DependencyGraph::default();
        graph.insert(qr("Sheet1", 1, 2), [qr("Sheet1", 1, 1)].into_iter().collect());
        let order = topo_order(&graph);
        let pos = |n: &QualifiedRef| order.iter().position(|x| x == n).unwrap();
        assert!(pos(&qr("Sheet1", 1, 1)) < pos(&qr("Sheet1", 1, 2)));
    }

    #[test]
    fn detect_cycles_finds_a_two_node_loop() {
        let mut graph = DependencyGraph::default();
        graph.insert(qr("Sheet1", 1, 1), [qr("Sheet1", 1, 2)].into_iter().collect());
        graph.insert(qr("Sheet1", 1, 2), [qr("Sheet1", 1, 1)].into_iter().collect());
        assert!(detect_cycles(&graph).is_err());
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let mut graph = DependencyGraph::default();
        graph.insert(qr("Sheet1", 1, 2), [qr("Sheet1", 1, 1)].into_iter().collect());
        assert!(detect_cycles(&graph).is_ok());
    }
}
