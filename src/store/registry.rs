use super::types::*;
use crate::analysis::dimension::Dimension;
use crate::error::{QuantityError, Result};
use ndarray::ArrayD;
use std::collections::HashSet;
use tracing::debug;

/// Arena owning every quantity. Ids are stable; formulas reference
/// quantities by id, never by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    quantities: Vec<Quantity>,
    used_names: HashSet<String>,
    dummy_counter: usize,
}

impl Registry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.quantities.len() }

    pub fn ids(&self) -> impl Iterator<Item = QuantityId> {
        (0..self.quantities.len()).map(QuantityId::new)
    }

    /// Next free `_N` name.
    pub fn dummy_name(&mut self) -> String {
        loop {
            self.dummy_counter += 1;
            let candidate = format!("_{}", self.dummy_counter);
            if !self.used_names.contains(&candidate) {
                return candidate;
            }
        }
    }

    pub fn add(&mut self, quantity: Quantity) -> QuantityId {
        let id = QuantityId::new(self.quantities.len());
        self.used_names.insert(quantity.name.clone());
        self.quantities.push(quantity);
        id
    }

    /// Adds an unresolved quantity; an unnamed one gets a dummy name.
    pub fn add_placeholder(&mut self, name: Option<&str>, longname: Option<String>) -> QuantityId {
        let name = match name {
            Some(n) => n.to_string(),
            None => self.dummy_name(),
        };
        self.add(Quantity::placeholder(name, longname))
    }

    pub fn get(&self, id: QuantityId) -> Result<&Quantity> {
        self.quantities
            .get(id.index())
            .ok_or(QuantityError::UnknownQuantity { id: id.0 })
    }

    pub fn get_mut(&mut self, id: QuantityId) -> Result<&mut Quantity> {
        self.quantities
            .get_mut(id.index())
            .ok_or(QuantityError::UnknownQuantity { id: id.0 })
    }

    /// Most recently added quantity called `name`.
    pub fn find(&self, name: &str) -> Option<QuantityId> {
        self.quantities
            .iter()
            .rposition(|q| q.name == name)
            .map(QuantityId::new)
    }

    /// Stores fit results in a parameter placeholder.
    pub fn resolve_fit(&mut self, id: QuantityId, value: ArrayD<f64>, error: ArrayD<f64>) -> Result<()> {
        let q = self.get_mut(id)?;
        q.resolve(value, Some(error))?;
        q.value_formula = Some(Derivation::Fit);
        q.error_formula = Some(Derivation::Fit);
        debug!(name = %q.name, "resolved fit parameter");
        Ok(())
    }

    /// Sets an inferred dimension. Any preferred unit was chosen for the old
    /// (unknown) dimension and is dropped.
    pub fn assign_dimension(&mut self, id: QuantityId, dim: Dimension) -> Result<()> {
        let q = self.get_mut(id)?;
        debug!(name = %q.name, dim = %dim, "assigned dimension");
        q.dim = Some(dim);
        q.prefer_unit = None;
        Ok(())
    }

    /// Fills a placeholder with a fully constructed quantity, keeping its name.
    pub fn define(&mut self, id: QuantityId, mut quantity: Quantity) -> Result<()> {
        let slot = self.get_mut(id)?;
        if slot.is_resolved() {
            return Err(QuantityError::AlreadyResolved { name: slot.name.clone() });
        }
        quantity.name = slot.name.clone();
        if quantity.longname.is_none() {
            quantity.longname = slot.longname.take();
        }
        *slot = quantity;
        Ok(())
    }
}
