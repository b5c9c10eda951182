use super::render::to_plain;
use crate::analysis::topology;
use crate::analysis::units::{adjust_to_unit, UnitRegistry};
use crate::store::{Derivation, QuantityId, QuantityState, Registry};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the dependency tree of `target` with values in display units.
/// Quantities reached twice are printed once and referenced afterwards.
pub fn format_trace(registry: &Registry, units: &UnitRegistry, target: QuantityId) -> String {
    let mut tracer = Tracer {
        registry,
        units,
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    match registry.get(target) {
        Ok(q) => {
            let _ = writeln!(tracer.output, "TRACE for quantity '{}':", q.name);
            let _ = writeln!(tracer.output, "--------------------------------------------------");
            tracer.trace_node(target, 1, "");
        }
        Err(_) => {
            let _ = writeln!(tracer.output, "Error: Invalid quantity {}", target);
        }
    }
    tracer.output
}

struct Tracer<'a> {
    registry: &'a Registry,
    units: &'a UnitRegistry,
    visited_at_level: HashMap<QuantityId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, id: QuantityId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&id) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(id, level);

        let Ok(q) = self.registry.get(id) else {
            let _ = writeln!(self.output, "{}[L{}] {}", prefix, level, id);
            return;
        };
        let line_header = format!("[L{}] {}{}", level, q.name, self.format_value(id));

        match &q.value_formula {
            Some(Derivation::Formula(expr)) => {
                let _ = writeln!(self.output, "{}{} = {}", prefix, line_header, to_plain(self.registry, expr));
                let children: Vec<QuantityId> = topology::parents(self.registry, id)
                    .map(|p| p.into_iter().collect())
                    .unwrap_or_default();
                self.recurse_children(prefix, &children, level);
            }
            Some(Derivation::Fit) => {
                let _ = writeln!(self.output, "{}{} -> fit", prefix, line_header);
            }
            None if q.is_resolved() => {
                let _ = writeln!(self.output, "{}{} -> measured", prefix, line_header);
            }
            None => {
                let _ = writeln!(self.output, "{}{} -> placeholder", prefix, line_header);
            }
        }
    }

    fn recurse_children(&mut self, prefix: &str, children: &[QuantityId], level: usize) {
        let stem = self.build_child_stem(prefix);
        for (i, &child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            let full_prefix = format!("{}{}", stem, connector);
            self.trace_node(child, level + 1, &full_prefix);
        }
    }

    fn format_value(&self, id: QuantityId) -> String {
        let Ok(q) = self.registry.get(id) else {
            return "[?]".to_string();
        };
        if matches!(q.state, QuantityState::Placeholder) {
            return "[?]".to_string();
        }
        let Ok(adjusted) = adjust_to_unit(self.units, q, None) else {
            return "[?]".to_string();
        };
        let unit = if adjusted.unit == "1" { String::new() } else { format!(" {}", adjusted.unit) };
        if adjusted.value.len() != 1 {
            return format!("[len={}{}]", adjusted.value.len(), unit);
        }
        let value = adjusted.value.iter().next().copied().unwrap_or(f64::NAN);
        match adjusted.error.as_ref().and_then(|e| e.iter().next().copied()) {
            Some(err) => format!("[{:.3} ± {:.3}{}]", value, err, unit),
            None => format!("[{:.3}{}]", value, unit),
        }
    }

    fn build_child_stem(&self, current_prefix: &str) -> String {
        current_prefix.replace("`--", "   ").replace("|--", "|  ")
    }
}
