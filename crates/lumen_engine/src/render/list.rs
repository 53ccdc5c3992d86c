//! Per-frame render list
//!
//! Gathered fresh every frame from the scene roots: a node contributes when
//! it is effectively visible and its renderable satisfies the drawable
//! precondition. The list is sorted by `render_order` with a stable sort, so
//! equal keys keep scene traversal order.

use crate::scene::node::NodeRef;

/// Ordered collection of drawable nodes for one frame
#[derive(Default)]
pub struct RenderList {
    items: Vec<NodeRef>,
}

impl RenderList {
    /// Gather drawables from the given roots, pre-order, then sort
    pub fn gather(roots: &[NodeRef]) -> Self {
        let mut list = Self::default();
        for root in roots {
            root.visit_visible(&mut |node| {
                let drawable = node.with_renderable(|r| r.is_drawable()).unwrap_or(false);
                if drawable {
                    list.items.push(node.clone());
                }
            });
        }
        list.items
            .sort_by_key(|node| node.with_renderable(|r| r.render_order).unwrap_or(0));
        list
    }

    /// Drawable nodes in draw order
    pub fn nodes(&self) -> &[NodeRef] {
        &self.items
    }

    /// Nodes that also render into shadow maps, in the same order
    pub fn shadow_casters(&self) -> Vec<NodeRef> {
        self.items
            .iter()
            .filter(|node| node.with_renderable(|r| r.cast_shadow).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Number of drawables this frame
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the frame has nothing to draw
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::material::Material;
    use crate::scene::node::{Node, Renderable};
    use std::sync::Arc;

    fn drawable(label: &str, render_order: i32) -> NodeRef {
        let node = Node::new(label);
        let mut renderable = Renderable::new(
            Arc::new(Geometry::quad(1.0, 1.0)),
            Material::unlit(label, "src"),
        );
        renderable.render_order = render_order;
        node.set_renderable(renderable);
        node
    }

    #[test]
    fn list_is_sorted_by_render_order() {
        let root = Node::new("root");
        root.add_child(&drawable("late", 2));
        root.add_child(&drawable("first", 0));
        root.add_child(&drawable("middle", 1));

        let list = RenderList::gather(&[root]);
        let labels: Vec<_> = list
            .nodes()
            .iter()
            .map(|node| node.label().to_string())
            .collect();
        assert_eq!(labels, ["first", "middle", "late"]);
    }

    #[test]
    fn equal_orders_keep_traversal_order() {
        let root = Node::new("root");
        root.add_child(&drawable("a", 0));
        root.add_child(&drawable("b", 0));
        root.add_child(&drawable("c", 0));

        let list = RenderList::gather(&[root]);
        let labels: Vec<_> = list
            .nodes()
            .iter()
            .map(|node| node.label().to_string())
            .collect();
        assert_eq!(labels, ["a", "b", "c"]);
    }

    #[test]
    fn invisible_subtrees_are_excluded() {
        let root = Node::new("root");
        let hidden = drawable("hidden", 0);
        let nested = drawable("nested", 0);
        hidden.add_child(&nested);
        root.add_child(&hidden);
        root.add_child(&drawable("shown", 0));

        hidden.set_visible(false);
        let list = RenderList::gather(&[root]);
        assert_eq!(list.len(), 1);
        assert_eq!(list.nodes()[0].label(), "shown");
    }

    #[test]
    fn non_drawable_renderables_are_excluded() {
        let node = Node::new("incomplete");
        // Position-only geometry against a material that requires normals.
        let geometry = Geometry::triangle(
            crate::foundation::math::Vec3::zeros(),
            crate::foundation::math::Vec3::x(),
            crate::foundation::math::Vec3::y(),
        );
        node.set_renderable(Renderable::new(
            Arc::new(geometry),
            Material::new("lit", "src"),
        ));

        assert!(RenderList::gather(&[node]).is_empty());
    }

    #[test]
    fn shadow_casters_are_a_sublist() {
        let root = Node::new("root");
        let caster = drawable("caster", 0);
        let no_shadow = drawable("flat", 1);
        no_shadow.with_renderable(|r| r.cast_shadow = false);
        root.add_child(&caster);
        root.add_child(&no_shadow);

        let list = RenderList::gather(&[root]);
        assert_eq!(list.len(), 2);
        let casters = list.shadow_casters();
        assert_eq!(casters.len(), 1);
        assert_eq!(casters[0].label(), "caster");
    }
}
