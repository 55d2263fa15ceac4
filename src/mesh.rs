//! Nodes, elements and their containers.
//!
//! This is the domain the fields are evaluated over. Nodes and elements are shared handles
//! compared by identity; they are created through a [`Nodeset`] or [`Mesh`] obtained from a
//! [`FieldModule`](crate::field_module::FieldModule), and every structural change is reported to
//! the owning region so that live field caches are invalidated.
use crate::element::ElementShape;
use crate::error::{FieldError, FieldResult};
use crate::field_module::Region;
use crate::MAXIMUM_ELEMENT_XI_DIMENSIONS;
use log::error;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
struct NodeData {
    identifier: i32,
}

/// A node of the region's nodeset.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    pub fn identifier(&self) -> i32 {
        self.0.identifier
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.identifier())
    }
}

#[derive(Debug)]
struct ElementData {
    identifier: i32,
    shape: ElementShape,
    nodes: Vec<Node>,
}

/// An element of one of the region's meshes.
#[derive(Clone)]
pub struct Element(Rc<ElementData>);

impl Element {
    pub fn identifier(&self) -> i32 {
        self.0.identifier
    }

    pub fn shape(&self) -> ElementShape {
        self.0.shape
    }

    pub fn dimension(&self) -> usize {
        self.0.shape.dimension()
    }

    /// The element's nodes, in the local order of its shape.
    pub fn nodes(&self) -> &[Node] {
        &self.0.nodes
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element({}, {})", self.identifier(), self.shape())
    }
}

/// Handle to the nodes of a region.
#[derive(Clone)]
pub struct Nodeset {
    region: Rc<Region>,
}

impl Nodeset {
    pub(crate) fn new(region: Rc<Region>) -> Self {
        Self { region }
    }

    pub fn create_node(&self, identifier: i32) -> FieldResult<Node> {
        let mut nodes = self.region.nodes.borrow_mut();
        if nodes.contains_key(&identifier) {
            error!("Nodeset create_node. Node {} already exists", identifier);
            return Err(FieldError::invalid_argument(format!("node {} already exists", identifier)));
        }
        let node = Node(Rc::new(NodeData { identifier }));
        nodes.insert(identifier, node.clone());
        drop(nodes);
        self.region.notify_changed();
        Ok(node)
    }

    pub fn find_node_by_identifier(&self, identifier: i32) -> Option<Node> {
        self.region.nodes.borrow().get(&identifier).cloned()
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.find_node_by_identifier(node.identifier())
            .map_or(false, |existing| existing == *node)
    }

    pub fn size(&self) -> usize {
        self.region.nodes.borrow().len()
    }

    /// All nodes in order of increasing identifier.
    pub fn nodes(&self) -> Vec<Node> {
        self.region.nodes.borrow().values().cloned().collect()
    }
}

/// Handle to the elements of one dimension in a region.
#[derive(Clone)]
pub struct Mesh {
    region: Rc<Region>,
    dimension: usize,
}

impl Mesh {
    pub(crate) fn new(region: Rc<Region>, dimension: usize) -> Self {
        debug_assert!((1..=MAXIMUM_ELEMENT_XI_DIMENSIONS).contains(&dimension));
        Self { region, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Creates an element from nodes of the region's nodeset, in the local node order of `shape`.
    pub fn create_element(&self, identifier: i32, shape: ElementShape, nodes: &[Node]) -> FieldResult<Element> {
        if shape.dimension() != self.dimension {
            error!(
                "Mesh create_element. Shape {} has wrong dimension for mesh of dimension {}",
                shape, self.dimension
            );
            return Err(FieldError::invalid_argument("element shape does not match mesh dimension"));
        }
        if nodes.len() != shape.node_count() {
            error!(
                "Mesh create_element. Shape {} needs {} nodes, got {}",
                shape,
                shape.node_count(),
                nodes.len()
            );
            return Err(FieldError::invalid_argument("wrong number of element nodes"));
        }
        let nodeset = Nodeset::new(self.region.clone());
        if let Some(node) = nodes.iter().find(|node| !nodeset.contains(node)) {
            error!("Mesh create_element. {:?} is not from this region", node);
            return Err(FieldError::invalid_argument("element node is not from this region"));
        }

        let mut elements = self.region.elements[self.dimension - 1].borrow_mut();
        if elements.contains_key(&identifier) {
            error!("Mesh create_element. Element {} already exists", identifier);
            return Err(FieldError::invalid_argument(format!("element {} already exists", identifier)));
        }
        let element = Element(Rc::new(ElementData {
            identifier,
            shape,
            nodes: nodes.to_vec(),
        }));
        elements.insert(identifier, element.clone());
        drop(elements);
        self.region.notify_changed();
        Ok(element)
    }

    pub fn find_element_by_identifier(&self, identifier: i32) -> Option<Element> {
        self.region.elements[self.dimension - 1]
            .borrow()
            .get(&identifier)
            .cloned()
    }

    pub fn contains(&self, element: &Element) -> bool {
        self.find_element_by_identifier(element.identifier())
            .map_or(false, |existing| existing == *element)
    }

    pub fn size(&self) -> usize {
        self.region.elements[self.dimension - 1].borrow().len()
    }

    /// All elements in order of increasing identifier.
    pub fn elements(&self) -> Vec<Element> {
        self.region.elements[self.dimension - 1]
            .borrow()
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn region(&self) -> &Rc<Region> {
        &self.region
    }
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mesh{}d", self.dimension)
    }
}
