use std::cmp::Ordering;
use std::collections::{btree_map, BTreeMap, HashMap};

use schema::{DispatchError, Order, OrderId};

type Link = Option<Box<Node>>;

/// One priority key and every order that scored exactly that key.
/// A node's bucket is never empty while the node is in the tree.
#[derive(Debug)]
struct Node {
    key: f64,
    bucket: BTreeMap<OrderId, Order>,
    height: i32,
    left: Link,
    right: Link,
}

impl Node {
    fn new(order: Order) -> Self {
        Self {
            key: order.priority(),
            bucket: BTreeMap::from([(order.id(), order)]),
            height: 1,
            left: None,
            right: None,
        }
    }

    fn update_height(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
    }

    /// Left height minus right height
    fn balance_factor(&self) -> i32 {
        height(&self.left) - height(&self.right)
    }
}

fn height(link: &Link) -> i32 {
    link.as_ref().map_or(0, |node| node.height)
}

/// AVL tree of orders keyed by priority score.
///
/// Orders with the same score share a node. An id index maps each stored
/// order to its key, so lookups by id never scan the tree.
#[derive(Debug, Default)]
pub struct PriorityTree {
    root: Link,
    index: HashMap<OrderId, f64>,
}

impl PriorityTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders (not nodes)
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn height(&self) -> i32 {
        height(&self.root)
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.index.contains_key(&id)
    }

    /// Stores `order` under its priority, creating the node if needed
    pub fn insert(&mut self, order: Order) -> Result<(), DispatchError> {
        if self.index.contains_key(&order.id()) {
            return Err(DispatchError::DuplicateId(order.id()));
        }

        self.index.insert(order.id(), order.priority());
        insert(&mut self.root, order);
        Ok(())
    }

    /// Removes order `id` from the bucket at `key`, deleting the node once
    /// its bucket is empty
    pub fn remove(&mut self, id: OrderId, key: f64) -> Result<Order, DispatchError> {
        match self.index.get(&id) {
            Some(indexed) if indexed.total_cmp(&key).is_eq() => {}
            _ => return Err(DispatchError::NotFound(id)),
        }

        let order = remove(&mut self.root, key, id).ok_or(DispatchError::NotFound(id))?;
        self.index.remove(&id);
        Ok(order)
    }

    /// Removes order `id` wherever it is stored
    pub fn take(&mut self, id: OrderId) -> Result<Order, DispatchError> {
        let key = *self.index.get(&id).ok_or(DispatchError::NotFound(id))?;
        self.remove(id, key)
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        let key = *self.index.get(&id)?;
        let mut link = &self.root;
        while let Some(node) = link {
            link = match key.total_cmp(&node.key) {
                Ordering::Less => &node.left,
                Ordering::Greater => &node.right,
                Ordering::Equal => return node.bucket.get(&id),
            };
        }
        None
    }

    pub fn find_by_id(&self, id: OrderId) -> Result<&Order, DispatchError> {
        self.get(id).ok_or(DispatchError::NotFound(id))
    }

    /// Every order, highest priority first. Orders sharing a key come out
    /// by ascending id.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(&self.root)
    }

    /// Orders whose priority is at least `key`, highest first
    pub fn iter_at_least(&self, key: f64) -> impl Iterator<Item = &Order> {
        self.iter().take_while(move |order| order.priority() >= key)
    }

    /// Applies `f` to every order. `f` must not change priorities.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut Order)) {
        for_each_mut(&mut self.root, &mut |_| true, &mut f);
    }

    /// Applies `f` to every order whose priority is strictly below `key`
    pub fn for_each_below_mut(&mut self, key: f64, mut f: impl FnMut(&mut Order)) {
        for_each_mut(&mut self.root, &mut |node_key| node_key < key, &mut f);
    }

    /// Removes and returns every order matching `predicate`, highest
    /// priority first
    pub fn drain_where(&mut self, predicate: impl Fn(&Order) -> bool) -> Vec<Order> {
        let doomed = self
            .iter()
            .filter(|order| predicate(order))
            .map(|order| (order.id(), order.priority()))
            .collect::<Vec<_>>();

        doomed
            .into_iter()
            .filter_map(|(id, key)| self.remove(id, key).ok())
            .collect()
    }

    /// Empties the tree, returning every order highest priority first
    pub fn drain(&mut self) -> Vec<Order> {
        let orders = self.iter().cloned().collect();
        self.root = None;
        self.index.clear();
        orders
    }

    /// Checks the AVL height invariant and the stored heights of every node
    pub fn is_balanced(&self) -> bool {
        fn check(link: &Link) -> Option<i32> {
            let Some(node) = link else {
                return Some(0);
            };
            let left = check(&node.left)?;
            let right = check(&node.right)?;
            let balanced = (left - right).abs() <= 1
                && node.height == 1 + left.max(right)
                && !node.bucket.is_empty();
            balanced.then_some(1 + left.max(right))
        }

        check(&self.root).is_some()
    }
}

fn insert(link: &mut Link, order: Order) {
    match link {
        None => {
            *link = Some(Box::new(Node::new(order)));
            return;
        }
        Some(node) => match order.priority().total_cmp(&node.key) {
            Ordering::Less => insert(&mut node.left, order),
            Ordering::Greater => insert(&mut node.right, order),
            Ordering::Equal => {
                node.bucket.insert(order.id(), order);
                return;
            }
        },
    }

    rebalance(link);
}

fn remove(link: &mut Link, key: f64, id: OrderId) -> Option<Order> {
    let node = link.as_mut()?;
    let (removed, emptied) = match key.total_cmp(&node.key) {
        Ordering::Less => (remove(&mut node.left, key, id), false),
        Ordering::Greater => (remove(&mut node.right, key, id), false),
        Ordering::Equal => {
            let removed = node.bucket.remove(&id);
            (removed, node.bucket.is_empty())
        }
    };

    if emptied {
        unlink(link);
    }
    rebalance(link);
    removed
}

/// Replaces the node at `link` with its in-order successor (or its only child)
fn unlink(link: &mut Link) {
    let Some(mut node) = link.take() else {
        return;
    };

    *link = match (node.left.take(), node.right.take()) {
        (None, None) => None,
        (Some(child), None) | (None, Some(child)) => Some(child),
        (Some(left), Some(right)) => {
            let mut right = Some(right);
            match take_min(&mut right) {
                Some(mut successor) => {
                    successor.left = Some(left);
                    successor.right = right;
                    successor.update_height();
                    Some(successor)
                }
                None => right,
            }
        }
    };
}

/// Detaches the leftmost node of the subtree, rebalancing on the way back up
fn take_min(link: &mut Link) -> Option<Box<Node>> {
    let node = link.as_mut()?;
    if node.left.is_some() {
        let min = take_min(&mut node.left);
        rebalance(link);
        min
    } else {
        let mut min = link.take()?;
        *link = min.right.take();
        Some(min)
    }
}

/// `in_bound` must be downward closed: once a key fails, every larger key fails
fn for_each_mut(
    link: &mut Link,
    in_bound: &mut impl FnMut(f64) -> bool,
    f: &mut impl FnMut(&mut Order),
) {
    let Some(node) = link else {
        return;
    };

    let wanted = in_bound(node.key);
    for_each_mut(&mut node.left, in_bound, f);
    if wanted {
        node.bucket.values_mut().for_each(|order| f(order));
        for_each_mut(&mut node.right, in_bound, f);
    }
}

fn rebalance(link: &mut Link) {
    if let Some(node) = link.take() {
        *link = Some(rebalanced(node));
    }
}

fn rebalanced(mut node: Box<Node>) -> Box<Node> {
    node.update_height();

    let balance = node.balance_factor();
    if balance > 1 {
        if node.left.as_ref().map_or(0, |left| left.balance_factor()) < 0 {
            node.left = node.left.take().map(rotate_left);
        }
        rotate_right(node)
    } else if balance < -1 {
        if node.right.as_ref().map_or(0, |right| right.balance_factor()) > 0 {
            node.right = node.right.take().map(rotate_right);
        }
        rotate_left(node)
    } else {
        node
    }
}

fn rotate_right(mut node: Box<Node>) -> Box<Node> {
    let Some(mut pivot) = node.left.take() else {
        return node;
    };
    node.left = pivot.right.take();
    node.update_height();
    pivot.right = Some(node);
    pivot.update_height();
    pivot
}

fn rotate_left(mut node: Box<Node>) -> Box<Node> {
    let Some(mut pivot) = node.right.take() else {
        return node;
    };
    node.right = pivot.left.take();
    node.update_height();
    pivot.left = Some(node);
    pivot.update_height();
    pivot
}

/// Reverse in-order walk: highest key first
pub struct Iter<'a> {
    stack: Vec<&'a Node>,
    bucket: Option<btree_map::Values<'a, OrderId, Order>>,
}

impl<'a> Iter<'a> {
    fn new(root: &'a Link) -> Self {
        let mut iter = Self {
            stack: Vec::new(),
            bucket: None,
        };
        iter.push_right_spine(root.as_deref());
        iter
    }

    fn push_right_spine(&mut self, mut node: Option<&'a Node>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.right.as_deref();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Order;

    fn next(&mut self) -> Option<&'a Order> {
        loop {
            if let Some(order) = self.bucket.as_mut().and_then(Iterator::next) {
                return Some(order);
            }
            let node = self.stack.pop()?;
            self.push_right_spine(node.left.as_deref());
            self.bucket = Some(node.bucket.values());
        }
    }
}
