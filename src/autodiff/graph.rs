//! The tape that records a differentiable computation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use ndarray::ArrayD;

use super::{grad, Var};
use crate::nn::{Parameter, ParameterId};
use crate::{HnnError, Result};

pub(crate) type NodeId = usize;

/// An operation recorded on the tape.
///
/// Shapes needed by the reverse sweep are read back from the input nodes,
/// so ops only carry what cannot be recovered that way.
#[derive(Clone, Debug)]
pub(crate) enum Op {
    Leaf,
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    Mul(NodeId, NodeId),
    Neg(NodeId),
    Scale(NodeId, f64),
    AddScalar(NodeId),
    MatMul(NodeId, NodeId),
    Transpose(NodeId),
    Sum(NodeId),
    Expand(NodeId),
    SumRows(NodeId),
    BroadcastRows(NodeId),
    Reshape(NodeId),
    SliceLast { input: NodeId, start: usize },
    PadLast { input: NodeId, start: usize },
    ConcatLast(NodeId, NodeId),
    Tanh(NodeId),
    Sigmoid(NodeId),
    Softplus(NodeId),
    MulConst(NodeId, Rc<ArrayD<f64>>),
}

pub(crate) struct Node {
    pub(crate) op: Op,
    pub(crate) value: ArrayD<f64>,
    pub(crate) requires_grad: bool,
}

pub(crate) struct Tape {
    pub(crate) nodes: Vec<Node>,
    track_parameters: bool,
    bound: HashMap<ParameterId, NodeId>,
}

/// Handle to a computation graph.
///
/// Cloning is cheap and yields a handle to the same tape. A graph is built
/// for one forward pass (or one training batch) and dropped afterwards.
#[derive(Clone)]
pub struct Graph {
    pub(crate) tape: Rc<RefCell<Tape>>,
}

impl Graph {
    /// Create an empty graph. Parameters bound to it are constants.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Create an empty graph whose bound parameters require gradients.
    pub fn with_parameter_tracking() -> Self {
        Self::build(true)
    }

    fn build(track_parameters: bool) -> Self {
        Graph {
            tape: Rc::new(RefCell::new(Tape {
                nodes: Vec::new(),
                track_parameters,
                bound: HashMap::new(),
            })),
        }
    }

    /// Whether parameters bound to this graph take part in differentiation.
    pub fn tracks_parameters(&self) -> bool {
        self.tape.borrow().track_parameters
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.tape.borrow().nodes.len()
    }

    /// Check if nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record an input that requires gradients.
    pub fn variable(&self, value: ArrayD<f64>) -> Var {
        self.push(Op::Leaf, value, true)
    }

    /// Record an input that does not require gradients.
    pub fn constant(&self, value: ArrayD<f64>) -> Var {
        self.push(Op::Leaf, value, false)
    }

    /// Bind a parameter's current value as a leaf of this graph.
    ///
    /// The first bind records the leaf; later binds of the same parameter
    /// return the same node so gradients accumulate in one place.
    pub fn bind_parameter(&self, parameter: &Parameter) -> Var {
        let cached = self.tape.borrow().bound.get(&parameter.id()).copied();
        if let Some(id) = cached {
            return self.var(id);
        }
        let track = self.tracks_parameters();
        let var = self.push(Op::Leaf, parameter.data().clone(), track);
        self.tape.borrow_mut().bound.insert(parameter.id(), var.id);
        var
    }

    /// Gradients of `loss` with respect to every parameter bound to this graph.
    pub fn parameter_gradients(&self, loss: &Var) -> Result<Vec<(ParameterId, ArrayD<f64>)>> {
        if !self.tracks_parameters() {
            return Err(HnnError::GradientUnavailable(
                "graph was built without parameter tracking".to_string(),
            ));
        }
        let mut bound: Vec<(ParameterId, NodeId)> = self
            .tape
            .borrow()
            .bound
            .iter()
            .map(|(pid, node)| (*pid, *node))
            .collect();
        if bound.is_empty() {
            return Err(HnnError::GradientUnavailable(
                "no parameters are bound to the graph".to_string(),
            ));
        }
        bound.sort_by_key(|(_, node)| *node);

        let vars: Vec<Var> = bound.iter().map(|(_, node)| self.var(*node)).collect();
        let wrt: Vec<&Var> = vars.iter().collect();
        let grads = grad(loss, &wrt, false)?;

        Ok(bound
            .into_iter()
            .zip(grads)
            .map(|((pid, _), g)| (pid, g.value()))
            .collect())
    }

    pub(crate) fn push(&self, op: Op, value: ArrayD<f64>, requires_grad: bool) -> Var {
        let mut tape = self.tape.borrow_mut();
        let id = tape.nodes.len();
        tape.nodes.push(Node {
            op,
            value,
            requires_grad,
        });
        Var {
            id,
            graph: self.clone(),
        }
    }

    pub(crate) fn var(&self, id: NodeId) -> Var {
        Var {
            id,
            graph: self.clone(),
        }
    }

    pub(crate) fn op(&self, id: NodeId) -> Op {
        self.tape.borrow().nodes[id].op.clone()
    }

    pub(crate) fn shape(&self, id: NodeId) -> Vec<usize> {
        self.tape.borrow().nodes[id].value.shape().to_vec()
    }

    pub(crate) fn requires_grad(&self, id: NodeId) -> bool {
        self.tape.borrow().nodes[id].requires_grad
    }

    pub(crate) fn set_requires_grad(&self, id: NodeId) {
        self.tape.borrow_mut().nodes[id].requires_grad = true;
    }

    /// Drop every node recorded at or after `len`.
    pub(crate) fn truncate(&self, len: usize) {
        self.tape.borrow_mut().nodes.truncate(len);
    }

    pub(crate) fn same_as(&self, other: &Graph) -> bool {
        Rc::ptr_eq(&self.tape, &other.tape)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.len())
            .field("tracks_parameters", &self.tracks_parameters())
            .finish()
    }
}
