//! Presentation colours attached to shapes through STYLED_ITEM.

use std::collections::HashMap;

use brepweb_core::Material;
use glam::Vec4;

use crate::entities::{EntityGraph, StepEntity};

/// Upper bound on entities visited while resolving one style chain.
const MAX_STYLE_DEPTH: usize = 64;

/// Colour per styled item, built once per model.
#[derive(Debug, Default)]
pub struct ColourIndex {
    by_item: HashMap<u64, (String, Vec4)>,
}

impl ColourIndex {
    /// Resolve every STYLED_ITEM in the graph. When several items style the
    /// same shape the first in file order wins.
    pub fn build(graph: &EntityGraph) -> Self {
        let mut by_item = HashMap::new();
        for id in graph.styled_items() {
            let Some(StepEntity::StyledItem { styles, item }) = graph.get(id) else {
                continue;
            };
            if by_item.contains_key(item) {
                continue;
            }
            if let Some(colour) = styles.iter().find_map(|s| resolve_colour(graph, *s)) {
                by_item.insert(*item, colour);
            }
        }
        tracing::debug!(styled = by_item.len(), "colour index built");
        Self { by_item }
    }

    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }

    /// Colour styled directly on an entity.
    pub fn colour(&self, id: u64) -> Option<Vec4> {
        self.by_item.get(&id).map(|(_, c)| *c)
    }

    /// Material for the first of `ids` that carries a colour.
    pub fn material(&self, ids: impl IntoIterator<Item = u64>) -> Option<Material> {
        ids.into_iter()
            .find_map(|id| self.by_item.get(&id))
            .map(|(name, colour)| {
                let name = if name.is_empty() { "StepColour" } else { name.as_str() };
                Material::colored(name, *colour).double_sided()
            })
    }
}

/// Depth-first walk from a presentation style to its first colour.
fn resolve_colour(graph: &EntityGraph, start: u64) -> Option<(String, Vec4)> {
    let mut stack = vec![start];
    let mut visited = 0;
    while let Some(id) = stack.pop() {
        visited += 1;
        if visited > MAX_STYLE_DEPTH {
            break;
        }
        if let Some(colour) = graph.colour(id) {
            return Some(colour);
        }
        if let Some(raw) = graph.raw(id) {
            let mut refs = Vec::new();
            raw.params.iter().for_each(|p| p.references(&mut refs));
            // Reverse so the first reference is explored first.
            stack.extend(refs.into_iter().rev());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p21::parse_data_section;

    const STYLED: &str = "DATA;
#1=COLOUR_RGB('Steel',0.5,0.6,0.7);
#2=FILL_AREA_STYLE_COLOUR('',#1);
#3=FILL_AREA_STYLE('',(#2));
#4=SURFACE_STYLE_FILL_AREA(#3);
#5=SURFACE_SIDE_STYLE('',(#4));
#6=SURFACE_STYLE_USAGE(.BOTH.,#5);
#7=PRESENTATION_STYLE_ASSIGNMENT((#6));
#8=STYLED_ITEM('color',(#7),#20);
#9=COLOUR_RGB('',1.,0.,0.);
#10=FILL_AREA_STYLE_COLOUR('',#9);
#11=STYLED_ITEM('color',(#10),#20);
#12=STYLED_ITEM('color',(#10),#21);
#20=MANIFOLD_SOLID_BREP('part',#30);
#21=ADVANCED_FACE('',(),#31,.T.);
ENDSEC;";

    fn index() -> ColourIndex {
        let (_, instances) = parse_data_section(STYLED).unwrap();
        ColourIndex::build(&EntityGraph::new(instances))
    }

    #[test]
    fn test_resolves_through_style_chain() {
        let idx = index();
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.colour(20), Some(Vec4::new(0.5, 0.6, 0.7, 1.0)));
    }

    #[test]
    fn test_first_style_in_file_order_wins() {
        let material = index().material([20]).unwrap();
        assert_eq!(material.name, "Steel");
        assert!(material.double_sided);
    }

    #[test]
    fn test_material_falls_through_ids() {
        let idx = index();
        let material = idx.material([99, 21]).unwrap();
        assert_eq!(material.name, "StepColour");
        assert_eq!(material.base_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert!(idx.material([99]).is_none());
    }
}
