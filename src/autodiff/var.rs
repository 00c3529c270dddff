//! Graph-tracked tensors and their differentiable operations.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::rc::Rc;

use ndarray::{concatenate, Array2, ArrayD, Axis, Ix1, Ix2, IxDyn, Slice};

use super::graph::{Graph, NodeId, Op};

/// A tensor recorded on a [`Graph`].
///
/// Operations on a `Var` record new nodes on the same graph; gradients are
/// obtained with [`grad`](super::grad). Shape mismatches between operands
/// are programming errors and panic, as they do in `ndarray`.
#[derive(Clone)]
pub struct Var {
    pub(crate) id: NodeId,
    pub(crate) graph: Graph,
}

impl Var {
    /// The graph this variable lives on.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// A copy of the current value.
    pub fn value(&self) -> ArrayD<f64> {
        self.graph.tape.borrow().nodes[self.id].value.clone()
    }

    /// The value of a single-element tensor.
    pub fn item(&self) -> f64 {
        let tape = self.graph.tape.borrow();
        let value = &tape.nodes[self.id].value;
        assert_eq!(value.len(), 1, "item() on a tensor of shape {:?}", value.shape());
        value.iter().next().copied().unwrap_or_default()
    }

    /// Shape of the value.
    pub fn shape(&self) -> Vec<usize> {
        self.graph.shape(self.id)
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.graph.tape.borrow().nodes[self.id].value.ndim()
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.graph.tape.borrow().nodes[self.id].value.len()
    }

    /// Whether gradients flow into this variable.
    pub fn requires_grad(&self) -> bool {
        self.graph.requires_grad(self.id)
    }

    /// Enable gradient tracking on this node in place.
    ///
    /// Operations recorded afterwards propagate gradients back to it; the
    /// node behaves as a leaf for anything that produced it.
    pub fn requires_grad_(&self) -> Var {
        self.graph.set_requires_grad(self.id);
        self.clone()
    }

    /// A constant copy of this value, cut off from gradient flow.
    pub fn detach(&self) -> Var {
        self.graph.constant(self.value())
    }

    fn unary(&self, op: Op, f: impl FnOnce(&ArrayD<f64>) -> ArrayD<f64>) -> Var {
        let (value, requires_grad) = {
            let tape = self.graph.tape.borrow();
            let node = &tape.nodes[self.id];
            (f(&node.value), node.requires_grad)
        };
        self.graph.push(op, value, requires_grad)
    }

    fn binary(
        &self,
        other: &Var,
        op: Op,
        f: impl FnOnce(&ArrayD<f64>, &ArrayD<f64>) -> ArrayD<f64>,
    ) -> Var {
        assert!(
            self.graph.same_as(&other.graph),
            "operands belong to different graphs"
        );
        let (value, requires_grad) = {
            let tape = self.graph.tape.borrow();
            let a = &tape.nodes[self.id];
            let b = &tape.nodes[other.id];
            (f(&a.value, &b.value), a.requires_grad || b.requires_grad)
        };
        self.graph.push(op, value, requires_grad)
    }

    fn elementwise(&self, other: &Var, op: Op, f: impl Fn(f64, f64) -> f64) -> Var {
        self.binary(other, op, |a, b| {
            assert_eq!(
                a.shape(),
                b.shape(),
                "elementwise op on mismatched shapes"
            );
            let mut out = a.clone();
            out.zip_mut_with(b, |x, &y| *x = f(*x, y));
            out
        })
    }

    /// Multiply every element by a constant.
    pub fn scale(&self, factor: f64) -> Var {
        self.unary(Op::Scale(self.id, factor), |a| a.mapv(|x| x * factor))
    }

    /// Add a constant to every element.
    pub fn add_scalar(&self, offset: f64) -> Var {
        self.unary(Op::AddScalar(self.id), |a| a.mapv(|x| x + offset))
    }

    /// Elementwise square.
    pub fn square(&self) -> Var {
        self * self
    }

    /// Matrix product of two rank-2 tensors.
    pub fn matmul(&self, other: &Var) -> Var {
        self.binary(other, Op::MatMul(self.id, other.id), |a, b| {
            as_matrix(a).dot(&as_matrix(b)).into_dyn()
        })
    }

    /// Transpose of a rank-2 tensor.
    pub fn t(&self) -> Var {
        self.unary(Op::Transpose(self.id), |a| {
            as_matrix(a).t().as_standard_layout().into_owned().into_dyn()
        })
    }

    /// Sum of all elements, as a rank-0 tensor.
    pub fn sum(&self) -> Var {
        self.unary(Op::Sum(self.id), |a| ArrayD::from_elem(IxDyn(&[]), a.sum()))
    }

    /// Mean of all elements, as a rank-0 tensor.
    pub fn mean(&self) -> Var {
        let n = self.numel().max(1);
        self.sum().scale(1.0 / n as f64)
    }

    /// Broadcast a single-element tensor to `shape`.
    pub fn expand(&self, shape: &[usize]) -> Var {
        self.unary(Op::Expand(self.id), |a| {
            assert_eq!(a.len(), 1, "expand() needs a single-element tensor");
            let v = a.iter().next().copied().unwrap_or_default();
            ArrayD::from_elem(IxDyn(shape), v)
        })
    }

    /// Column sums of a rank-2 tensor: `(n, m) -> (m,)`.
    pub fn sum_rows(&self) -> Var {
        self.unary(Op::SumRows(self.id), |a| as_matrix(a).sum_axis(Axis(0)).into_dyn())
    }

    /// Repeat a rank-1 tensor as `rows` rows: `(m,) -> (rows, m)`.
    pub fn broadcast_rows(&self, rows: usize) -> Var {
        self.unary(Op::BroadcastRows(self.id), |a| {
            let v = a
                .view()
                .into_dimensionality::<Ix1>()
                .unwrap_or_else(|_| panic!("broadcast_rows() needs rank 1, got {:?}", a.shape()));
            Array2::from_shape_fn((rows, v.len()), |(_, j)| v[j]).into_dyn()
        })
    }

    /// Reinterpret the elements (row-major) under a new shape.
    pub fn reshape(&self, shape: &[usize]) -> Var {
        self.unary(Op::Reshape(self.id), |a| {
            let data: Vec<f64> = a.iter().copied().collect();
            ArrayD::from_shape_vec(IxDyn(shape), data).unwrap_or_else(|_| {
                panic!("cannot reshape {:?} into {:?}", a.shape(), shape)
            })
        })
    }

    /// Components `start..end` of the last axis.
    pub fn slice_last(&self, start: usize, end: usize) -> Var {
        self.unary(Op::SliceLast { input: self.id, start }, |a| {
            let axis = last_axis(a);
            a.slice_axis(axis, Slice::from(start..end))
                .as_standard_layout()
                .into_owned()
        })
    }

    /// Embed into a zero tensor whose last axis has length `total`,
    /// starting at `start`. Inverse of [`slice_last`](Self::slice_last).
    pub fn pad_last(&self, start: usize, total: usize) -> Var {
        self.unary(Op::PadLast { input: self.id, start }, |a| {
            let axis = last_axis(a);
            let mut shape = a.shape().to_vec();
            let len = shape[axis.index()];
            assert!(start + len <= total, "pad_last() out of range");
            shape[axis.index()] = total;
            let mut out = ArrayD::zeros(IxDyn(&shape));
            out.slice_axis_mut(axis, Slice::from(start..start + len))
                .assign(a);
            out
        })
    }

    /// Concatenate along the last axis.
    pub fn concat_last(&self, other: &Var) -> Var {
        self.binary(other, Op::ConcatLast(self.id, other.id), |a, b| {
            let axis = last_axis(a);
            concatenate(axis, &[a.view(), b.view()])
                .unwrap_or_else(|_| {
                    panic!("cannot concatenate {:?} with {:?}", a.shape(), b.shape())
                })
                .as_standard_layout()
                .into_owned()
        })
    }

    /// Hyperbolic tangent.
    pub fn tanh(&self) -> Var {
        self.unary(Op::Tanh(self.id), |a| a.mapv(f64::tanh))
    }

    /// Logistic sigmoid.
    pub fn sigmoid(&self) -> Var {
        self.unary(Op::Sigmoid(self.id), |a| a.mapv(sigmoid))
    }

    /// `ln(1 + e^x)`.
    pub fn softplus(&self) -> Var {
        self.unary(Op::Softplus(self.id), |a| {
            a.mapv(|x| x.max(0.0) + (-x.abs()).exp().ln_1p())
        })
    }

    /// Rectified linear unit.
    pub fn relu(&self) -> Var {
        self.leaky_relu(0.0)
    }

    /// Leaky rectified linear unit with the given negative slope.
    pub fn leaky_relu(&self, slope: f64) -> Var {
        let mask = self
            .graph
            .tape
            .borrow()
            .nodes[self.id]
            .value
            .mapv(|x| if x > 0.0 { 1.0 } else { slope });
        self.mul_const(mask)
    }

    /// Elementwise product with a constant tensor of the same shape.
    pub fn mul_const(&self, factor: ArrayD<f64>) -> Var {
        self.mul_const_shared(Rc::new(factor))
    }

    pub(crate) fn mul_const_shared(&self, factor: Rc<ArrayD<f64>>) -> Var {
        let op = Op::MulConst(self.id, Rc::clone(&factor));
        self.unary(op, |a| {
            assert_eq!(a.shape(), factor.shape(), "mul_const() on mismatched shapes");
            a * &*factor
        })
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("id", &self.id)
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad())
            .finish()
    }
}

impl Add for &Var {
    type Output = Var;
    fn add(self, rhs: &Var) -> Var {
        self.elementwise(rhs, Op::Add(self.id, rhs.id), |a, b| a + b)
    }
}

impl Sub for &Var {
    type Output = Var;
    fn sub(self, rhs: &Var) -> Var {
        self.elementwise(rhs, Op::Sub(self.id, rhs.id), |a, b| a - b)
    }
}

impl Mul for &Var {
    type Output = Var;
    fn mul(self, rhs: &Var) -> Var {
        self.elementwise(rhs, Op::Mul(self.id, rhs.id), |a, b| a * b)
    }
}

impl Neg for &Var {
    type Output = Var;
    fn neg(self) -> Var {
        self.unary(Op::Neg(self.id), |a| a.mapv(|x| -x))
    }
}

fn as_matrix(a: &ArrayD<f64>) -> ndarray::ArrayView2<'_, f64> {
    a.view()
        .into_dimensionality::<Ix2>()
        .unwrap_or_else(|_| panic!("expected a rank-2 tensor, got {:?}", a.shape()))
}

fn last_axis(a: &ArrayD<f64>) -> Axis {
    assert!(a.ndim() > 0, "rank-0 tensor has no last axis");
    Axis(a.ndim() - 1)
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
