//! Hierarchical layout cells.
//!
//! A [`Cell`] owns shapes and text labels and references other, already finished,
//! cells through [`Instance`]s. Instances carry a symbolic [`Transformation`] that is
//! only applied when a cell is flattened.
use std::hash::Hash;
use std::sync::Arc;

use arcstr::ArcStr;
use geometry::prelude::{Bbox, Mirror, Point, Polygon, Rect, Transform, TransformMut, Transformation};
use indexmap::{IndexMap, IndexSet};


/// A set of polygons grouped by layer.
///
/// A layer that is not present is equivalent to a layer with no polygons.
/// Layers iterate in the order they were first added.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSet<L: Hash + Eq> {
    layers: IndexMap<L, Vec<Polygon>>,
}

impl<L: Hash + Eq> Default for LayerSet<L> {
    fn default() -> Self {
        Self {
            layers: IndexMap::new(),
        }
    }
}

impl<L: Hash + Eq> LayerSet<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a polygon to `layer`.
    pub fn push(&mut self, layer: L, polygon: Polygon) {
        self.layers.entry(layer).or_default().push(polygon);
    }

    pub fn extend_layer(&mut self, layer: L, polygons: impl IntoIterator<Item = Polygon>) {
        self.layers.entry(layer).or_default().extend(polygons);
    }

    /// Makes sure `layer` has an entry, even if it has no polygons.
    pub fn ensure_layer(&mut self, layer: L) {
        self.layers.entry(layer).or_default();
    }

    /// The polygons on `layer`, empty if the layer is absent.
    pub fn get(&self, layer: &L) -> &[Polygon] {
        self.layers.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn contains_layer(&self, layer: &L) -> bool {
        self.layers.contains_key(layer)
    }

    pub fn remove(&mut self, layer: &L) -> Vec<Polygon> {
        self.layers.shift_remove(layer).unwrap_or_default()
    }

    pub fn layers(&self) -> impl Iterator<Item = &L> {
        self.layers.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&L, &[Polygon])> {
        self.layers.iter().map(|(l, p)| (l, p.as_slice()))
    }

    /// The number of layer entries, including empty ones.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// The total number of polygons across all layers.
    pub fn num_polygons(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }

    /// Returns `true` if no layer holds any polygon.
    pub fn is_empty(&self) -> bool {
        self.num_polygons() == 0
    }

    /// Moves all polygons of `other` into `self`.
    pub fn append(&mut self, other: LayerSet<L>) {
        for (layer, polygons) in other.layers {
            self.extend_layer(layer, polygons);
        }
    }
}

impl<L: Hash + Eq> IntoIterator for LayerSet<L> {
    type Item = (L, Vec<Polygon>);
    type IntoIter = indexmap::map::IntoIter<L, Vec<Polygon>>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.into_iter()
    }
}

impl<L: Hash + Eq> FromIterator<(L, Polygon)> for LayerSet<L> {
    fn from_iter<T: IntoIterator<Item = (L, Polygon)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (layer, polygon) in iter {
            set.push(layer, polygon);
        }
        set
    }
}

impl<L: Hash + Eq> TransformMut for LayerSet<L> {
    fn transform_mut(&mut self, trans: Transformation) {
        for polygons in self.layers.values_mut() {
            polygons.transform_mut(trans);
        }
    }
}

impl<L: Hash + Eq> Bbox for LayerSet<L> {
    fn bbox(&self) -> Option<Rect> {
        self.layers
            .values()
            .filter_map(|p| p.bbox())
            .reduce(Rect::union)
    }
}

/// A layout cell.
///
/// Cells are mutable while being built. Once wrapped in an [`Arc`] and referenced by an
/// [`Instance`], they are never modified again, so the instance graph cannot contain cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell<L> {
    name: ArcStr,
    instances: IndexMap<ArcStr, Instance<L>>,
    elements: Vec<Element<L>>,
}

/// A primitive layout element.
#[derive(Debug, Clone, PartialEq)]
pub enum Element<L> {
    /// A primitive layout shape.
    Shape(Shape<L>),
    /// A primitive text annotation.
    Text(Text<L>),
}

/// A primitive layout shape consisting of a layer and a polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape<L> {
    layer: L,
    polygon: Polygon,
}

/// A primitive text annotation consisting of a layer, string, and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Text<L> {
    layer: L,
    text: ArcStr,
    trans: Transformation,
}

/// A reference to a finished cell, placed with a transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance<L> {
    child: Arc<Cell<L>>,
    name: ArcStr,
    trans: Transformation,
}

/// A handle for composing further transformations onto a single instance.
///
/// Each operation is applied after the ones already accumulated on the instance.
/// Other instances of the same child are unaffected.
pub struct InstanceHandle<'a, L> {
    cell: &'a mut Cell<L>,
    index: usize,
}

impl<L> Cell<L> {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            instances: Default::default(),
            elements: Default::default(),
        }
    }

    /// The name of the cell.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    pub fn add_element(&mut self, element: impl Into<Element<L>>) {
        self.elements.push(element.into())
    }

    /// Adds a polygon on `layer`.
    pub fn add_shape(&mut self, layer: L, polygon: impl Into<Polygon>) {
        self.add_element(Shape::new(layer, polygon.into()));
    }

    /// Adds a text label on `layer` anchored at `position`.
    pub fn add_text(&mut self, layer: L, text: impl Into<ArcStr>, position: Point) {
        self.add_element(Text::with_transformation(
            layer,
            text,
            Transformation::translate(position.x, position.y),
        ));
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element<L>> {
        self.elements.iter()
    }

    /// Iterates over the shapes owned directly by this cell.
    pub fn shapes(&self) -> impl Iterator<Item = &Shape<L>> {
        self.elements.iter().filter_map(|e| match e {
            Element::Shape(s) => Some(s),
            Element::Text(_) => None,
        })
    }

    /// Iterates over the text labels owned directly by this cell.
    pub fn texts(&self) -> impl Iterator<Item = &Text<L>> {
        self.elements.iter().filter_map(|e| match e {
            Element::Text(t) => Some(t),
            Element::Shape(_) => None,
        })
    }

    /// Adds an instance of `child`, named after the child.
    ///
    /// The returned handle composes further transformations onto the new instance.
    pub fn add_instance(&mut self, child: Arc<Cell<L>>) -> InstanceHandle<'_, L> {
        let name = child.name.clone();
        self.add_named_instance(child, name)
    }

    /// Adds an instance of `child` with the given instance name.
    ///
    /// If the name is already taken, a numeric suffix is appended.
    pub fn add_named_instance(
        &mut self,
        child: Arc<Cell<L>>,
        name: impl Into<ArcStr>,
    ) -> InstanceHandle<'_, L> {
        let name = self.unique_instance_name(name.into());
        let (index, _) = self
            .instances
            .insert_full(name.clone(), Instance::new(child, name));
        InstanceHandle { cell: self, index }
    }

    fn unique_instance_name(&self, name: ArcStr) -> ArcStr {
        if !self.instances.contains_key(&name) {
            return name;
        }
        (1..)
            .map(|i| arcstr::format!("{}_{}", name, i))
            .find(|candidate| !self.instances.contains_key(candidate))
            .unwrap_or(name)
    }

    /// Gets the instance with the given name.
    ///
    /// # Panics
    ///
    /// Panics if no instance has the given name.
    pub fn instance_named(&self, name: &str) -> &Instance<L> {
        self.try_instance_named(name).unwrap()
    }

    /// Gets the instance with the given name.
    pub fn try_instance_named(&self, name: &str) -> Option<&Instance<L>> {
        self.instances.get(name)
    }

    /// Iterate over the instances of this cell.
    #[inline]
    pub fn instances(&self) -> impl Iterator<Item = &Instance<L>> {
        self.instances.values()
    }

    #[inline]
    pub fn has_instances(&self) -> bool {
        !self.instances.is_empty()
    }

    /// Cells referenced by this cell's hierarchy, children before parents.
    ///
    /// Cells shared by several instances appear once.
    pub fn dependencies(&self) -> Vec<Arc<Cell<L>>> {
        let mut seen = IndexSet::new();
        let mut order = Vec::new();
        self.dfs_postorder(&mut seen, &mut order);
        order
    }

    fn dfs_postorder(&self, seen: &mut IndexSet<*const Cell<L>>, order: &mut Vec<Arc<Cell<L>>>) {
        for inst in self.instances.values() {
            if seen.insert(Arc::as_ptr(&inst.child)) {
                inst.child.dfs_postorder(seen, order);
                order.push(inst.child.clone());
            }
        }
    }
}

impl<L: Clone + Hash + Eq> Cell<L> {
    /// Creates an instance-free cell holding every polygon of `layers`.
    pub fn from_layer_set(name: impl Into<ArcStr>, layers: LayerSet<L>) -> Self {
        let mut cell = Self::new(name);
        cell.add_layer_set(layers);
        cell
    }

    /// Adds every polygon of `layers` as shapes of this cell.
    pub fn add_layer_set(&mut self, layers: LayerSet<L>) {
        for (layer, polygons) in layers {
            for polygon in polygons {
                self.add_shape(layer.clone(), polygon);
            }
        }
    }

    /// Collects every polygon of the hierarchy, transformed into this cell's frame.
    pub fn flatten(&self) -> LayerSet<L> {
        let mut out = LayerSet::new();
        self.flatten_into(Transformation::identity(), &|_: &L| true, &mut out);
        tracing::debug!(
            cell = %self.name,
            layers = out.num_layers(),
            polygons = out.num_polygons(),
            "flattened cell"
        );
        out
    }

    /// Flattens the hierarchy, keeping only the requested layers.
    ///
    /// Every requested layer has an entry in the result, even if it holds no polygons.
    pub fn extract(&self, layers: impl IntoIterator<Item = L>) -> LayerSet<L> {
        let mut out = LayerSet::new();
        let mut wanted = IndexSet::new();
        for layer in layers {
            out.ensure_layer(layer.clone());
            wanted.insert(layer);
        }
        self.flatten_into(Transformation::identity(), &|l: &L| wanted.contains(l), &mut out);
        out
    }

    fn flatten_into(
        &self,
        trans: Transformation,
        keep: &dyn Fn(&L) -> bool,
        out: &mut LayerSet<L>,
    ) {
        for shape in self.shapes().filter(|s| keep(&s.layer)) {
            out.push(shape.layer.clone(), shape.polygon.clone().transform(trans));
        }
        for inst in self.instances.values() {
            inst.child
                .flatten_into(Transformation::cascade(trans, inst.trans), keep, out);
        }
    }

    /// Collects every text label of the hierarchy, transformed into this cell's frame.
    pub fn flatten_texts(&self) -> Vec<Text<L>> {
        let mut out = Vec::new();
        self.flatten_texts_into(Transformation::identity(), &mut out);
        out
    }

    fn flatten_texts_into(&self, trans: Transformation, out: &mut Vec<Text<L>>) {
        out.extend(self.texts().map(|t| t.clone().transform(trans)));
        for inst in self.instances.values() {
            inst.child
                .flatten_texts_into(Transformation::cascade(trans, inst.trans), out);
        }
    }

    /// Builds a new instance-free cell with all polygons and labels of this hierarchy.
    pub fn flattened(&self, name: impl Into<ArcStr>) -> Self {
        let mut cell = Self::from_layer_set(name, self.flatten());
        for text in self.flatten_texts() {
            cell.add_element(text);
        }
        cell
    }
}

impl<L: Clone + Hash + Eq> Bbox for Cell<L> {
    fn bbox(&self) -> Option<Rect> {
        self.flatten().bbox()
    }
}

impl<'a, L> InstanceHandle<'a, L> {
    fn instance_mut(&mut self) -> &mut Instance<L> {
        &mut self.cell.instances[self.index]
    }

    fn compose(mut self, trans: Transformation) -> Self {
        let inst = self.instance_mut();
        inst.trans = inst.trans.then(trans);
        self
    }

    /// Translates the instance by `(dx, dy)`.
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        self.compose(Transformation::translate(dx, dy))
    }

    /// Rotates the instance counterclockwise by `angle` degrees about the origin.
    pub fn rotate(self, angle: f64) -> Self {
        self.compose(Transformation::rotate(angle))
    }

    /// Rotates the instance counterclockwise by `angle` degrees about `center`.
    pub fn rotate_around(self, angle: f64, center: Point) -> Self {
        self.compose(Transformation::rotate_around(angle, center))
    }

    /// Mirrors the instance about a vertical or horizontal line.
    pub fn mirror(self, line: Mirror) -> Self {
        self.compose(Transformation::mirror(line))
    }

    /// Applies an arbitrary transformation after the accumulated ones.
    pub fn transform(self, trans: Transformation) -> Self {
        self.compose(trans)
    }

    /// The name of the instance.
    pub fn name(&self) -> &ArcStr {
        &self.cell.instances[self.index].name
    }

    /// The transformation accumulated so far.
    pub fn transformation(&self) -> Transformation {
        self.cell.instances[self.index].trans
    }
}

impl<L> From<Shape<L>> for Element<L> {
    fn from(value: Shape<L>) -> Self {
        Self::Shape(value)
    }
}

impl<L> From<Text<L>> for Element<L> {
    fn from(value: Text<L>) -> Self {
        Self::Text(value)
    }
}

impl<L> Shape<L> {
    #[inline]
    pub fn new(layer: L, polygon: Polygon) -> Self {
        Self { layer, polygon }
    }

    #[inline]
    pub fn layer(&self) -> &L {
        &self.layer
    }

    #[inline]
    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }
}

impl<L> Text<L> {
    #[inline]
    pub fn new(layer: L, text: impl Into<ArcStr>) -> Self {
        Self {
            layer,
            text: text.into(),
            trans: Default::default(),
        }
    }

    #[inline]
    pub fn with_transformation(
        layer: L,
        text: impl Into<ArcStr>,
        trans: impl Into<Transformation>,
    ) -> Self {
        Self {
            layer,
            text: text.into(),
            trans: trans.into(),
        }
    }

    #[inline]
    pub fn layer(&self) -> &L {
        &self.layer
    }

    #[inline]
    pub fn text(&self) -> &ArcStr {
        &self.text
    }

    #[inline]
    pub fn transformation(&self) -> Transformation {
        self.trans
    }

    /// The anchor point of the label.
    #[inline]
    pub fn position(&self) -> Point {
        self.trans.offset_point()
    }
}

impl<L> TransformMut for Text<L> {
    fn transform_mut(&mut self, trans: Transformation) {
        self.trans = Transformation::cascade(trans, self.trans);
    }
}

impl<L> Instance<L> {
    pub fn new(child: Arc<Cell<L>>, name: impl Into<ArcStr>) -> Self {
        Self {
            child,
            name: name.into(),
            trans: Default::default(),
        }
    }

    pub fn with_transformation(
        child: Arc<Cell<L>>,
        name: impl Into<ArcStr>,
        transformation: impl Into<Transformation>,
    ) -> Self {
        Self {
            child,
            name: name.into(),
            trans: transformation.into(),
        }
    }

    #[inline]
    pub fn child(&self) -> &Arc<Cell<L>> {
        &self.child
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn transformation(&self) -> Transformation {
        self.trans
    }
}
