//! Topological ordering of defines

use crate::{GraphError, GraphResult};
use indexmap::IndexMap;
use octofhir_cqm_ast::{Define, Library};
use std::collections::HashMap;

/// Defines in an order where every reference is evaluated before its
/// referrer, with each define's direct dependencies.
///
/// Ties are broken by declaration order, so building the order twice from the
/// same library gives the same sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationOrder {
    defines: IndexMap<String, Vec<String>>,
}

impl EvaluationOrder {
    /// Define names in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.defines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.defines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    /// Position of `name` in the order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.defines.get_index_of(name)
    }

    /// Defines `name` references directly
    pub fn dependencies_of(&self, name: &str) -> Option<&[String]> {
        self.defines.get(name).map(Vec::as_slice)
    }
}

/// Order the defines of `library` for evaluation.
///
/// Fails with [`GraphError::UnknownReference`] on the first reference (in
/// declaration order) to a name no define declares, and with
/// [`GraphError::Cycle`] when defines reference each other, a define
/// referencing itself included.
pub fn build(library: &Library) -> GraphResult<EvaluationOrder> {
    let declared: HashMap<&str, &Define> = library
        .defines
        .iter()
        .map(|define| (define.name.as_str(), define))
        .collect();

    for define in &library.defines {
        if let Some(missing) = define
            .references
            .iter()
            .find(|name| !declared.contains_key(name.as_str()))
        {
            return Err(GraphError::UnknownReference {
                name: missing.clone(),
                referenced_by: define.name.clone(),
            });
        }
    }

    let mut walk = Walk {
        declared: &declared,
        marks: HashMap::with_capacity(declared.len()),
        stack: Vec::new(),
        order: IndexMap::with_capacity(declared.len()),
    };
    for define in &library.defines {
        walk.visit(define)?;
    }

    log::debug!(
        "Evaluation order for {}: {}",
        library.measure_identifier(),
        walk.order.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    Ok(EvaluationOrder {
        defines: walk.order,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path
    Visiting,
    /// Already placed in the order
    Done,
}

struct Walk<'a> {
    declared: &'a HashMap<&'a str, &'a Define>,
    marks: HashMap<&'a str, Mark>,
    stack: Vec<&'a str>,
    order: IndexMap<String, Vec<String>>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, define: &'a Define) -> GraphResult<()> {
        let name = define.name.as_str();
        match self.marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = self.stack.iter().position(|n| *n == name).unwrap_or(0);
                let cycle = self.stack[start..].iter().map(|n| n.to_string()).collect();
                return Err(GraphError::Cycle(cycle));
            }
            None => {}
        }

        self.marks.insert(name, Mark::Visiting);
        self.stack.push(name);
        for reference in &define.references {
            let dependency = self.declared.get(reference.as_str()).copied().ok_or_else(|| {
                GraphError::UnknownReference {
                    name: reference.clone(),
                    referenced_by: define.name.clone(),
                }
            })?;
            self.visit(dependency)?;
        }
        self.stack.pop();
        self.marks.insert(name, Mark::Done);

        self.order
            .insert(define.name.clone(), define.references.iter().cloned().collect());
        Ok(())
    }
}
