//! Reverse sweep over the tape.
//!
//! Every adjoint is built from recorded ops, so with `create_graph` the
//! gradients are ordinary graph nodes and can be differentiated again.

use ndarray::ArrayD;

use super::graph::{Graph, NodeId, Op};
use super::Var;
use crate::{HnnError, Result};

/// Gradient of a single-element `output` with respect to each of `wrt`.
///
/// With `create_graph` the returned variables stay on the graph and carry
/// the dependency structure needed for higher-order derivatives. Without
/// it they are detached constants and the intermediate nodes are dropped.
///
/// A `wrt` variable that `output` does not depend on gets a zero gradient.
pub fn grad(output: &Var, wrt: &[&Var], create_graph: bool) -> Result<Vec<Var>> {
    let graph = output.graph().clone();

    if output.numel() != 1 {
        return Err(HnnError::GradientUnavailable(format!(
            "output must hold a single element, got shape {:?}",
            output.shape()
        )));
    }
    if !output.requires_grad() {
        return Err(HnnError::GradientUnavailable(
            "output does not depend on any variable that requires grad".to_string(),
        ));
    }
    for var in wrt {
        if !var.graph().same_as(&graph) {
            return Err(HnnError::GradientUnavailable(
                "input belongs to a different graph".to_string(),
            ));
        }
        if !var.requires_grad() {
            return Err(HnnError::GradientUnavailable(format!(
                "input of shape {:?} does not require grad",
                var.shape()
            )));
        }
    }

    let mark = graph.len();
    let targets: Vec<NodeId> = wrt.iter().map(|var| var.id).collect();
    let adjoints = backpropagate(&graph, output, &targets);

    let grads: Vec<Var> = wrt
        .iter()
        .map(|var| match adjoints.get(var.id).and_then(Option::as_ref) {
            Some(g) => g.clone(),
            None => graph.constant(ArrayD::zeros(var.shape())),
        })
        .collect();

    if create_graph {
        return Ok(grads);
    }

    let values: Vec<ArrayD<f64>> = grads.iter().map(Var::value).collect();
    drop(grads);
    drop(adjoints);
    graph.truncate(mark);
    Ok(values.into_iter().map(|v| graph.constant(v)).collect())
}

fn inputs(op: &Op) -> Vec<NodeId> {
    match *op {
        Op::Leaf => Vec::new(),
        Op::Add(a, b) | Op::Sub(a, b) | Op::Mul(a, b) | Op::MatMul(a, b) | Op::ConcatLast(a, b) => {
            vec![a, b]
        }
        Op::Neg(a)
        | Op::Scale(a, _)
        | Op::AddScalar(a)
        | Op::Transpose(a)
        | Op::Sum(a)
        | Op::Expand(a)
        | Op::SumRows(a)
        | Op::BroadcastRows(a)
        | Op::Reshape(a)
        | Op::Tanh(a)
        | Op::Sigmoid(a)
        | Op::Softplus(a)
        | Op::MulConst(a, _) => vec![a],
        Op::SliceLast { input, .. } | Op::PadLast { input, .. } => vec![input],
    }
}

/// Marks nodes at or below `last` that lie on a path from some target.
fn reaching(graph: &Graph, last: NodeId, targets: &[NodeId]) -> Vec<bool> {
    let mut reach = vec![false; last + 1];
    for id in 0..=last {
        let on_path = targets.contains(&id)
            || (graph.requires_grad(id) && inputs(&graph.op(id)).iter().any(|&i| reach[i]));
        reach[id] = on_path;
    }
    reach
}

fn backpropagate(graph: &Graph, output: &Var, targets: &[NodeId]) -> Vec<Option<Var>> {
    let n = output.id + 1;
    let reach = reaching(graph, output.id, targets);
    let mut adjoints: Vec<Option<Var>> = vec![None; n];
    if !reach[output.id] {
        return adjoints;
    }
    adjoints[output.id] = Some(graph.constant(ArrayD::ones(output.shape())));

    for id in (0..n).rev() {
        let Some(g) = adjoints[id].clone() else {
            continue;
        };
        // a target reached only as itself has nothing to pass on
        if !inputs(&graph.op(id)).iter().any(|&i| reach[i]) {
            continue;
        }
        for (input, contribution) in vjp(graph, id, &g, &reach) {
            let slot = &mut adjoints[input];
            *slot = Some(match slot.take() {
                Some(acc) => &acc + &contribution,
                None => contribution,
            });
        }
    }

    adjoints
}

/// Vector-Jacobian products of node `out` for upstream gradient `g`,
/// restricted to inputs that lead back to a target.
fn vjp(graph: &Graph, out: NodeId, g: &Var, reach: &[bool]) -> Vec<(NodeId, Var)> {
    let needs = |id: NodeId| reach[id];
    let var = |id: NodeId| graph.var(id);
    let mut contributions = Vec::with_capacity(2);

    match graph.op(out) {
        Op::Leaf => {}
        Op::Add(a, b) => {
            if needs(a) {
                contributions.push((a, g.clone()));
            }
            if needs(b) {
                contributions.push((b, g.clone()));
            }
        }
        Op::Sub(a, b) => {
            if needs(a) {
                contributions.push((a, g.clone()));
            }
            if needs(b) {
                contributions.push((b, -g));
            }
        }
        Op::Mul(a, b) => {
            if needs(a) {
                contributions.push((a, g * &var(b)));
            }
            if needs(b) {
                contributions.push((b, g * &var(a)));
            }
        }
        Op::Neg(a) => contributions.push((a, -g)),
        Op::Scale(a, factor) => contributions.push((a, g.scale(factor))),
        Op::AddScalar(a) => contributions.push((a, g.clone())),
        Op::MatMul(a, b) => {
            if needs(a) {
                contributions.push((a, g.matmul(&var(b).t())));
            }
            if needs(b) {
                contributions.push((b, var(a).t().matmul(g)));
            }
        }
        Op::Transpose(a) => contributions.push((a, g.t())),
        Op::Sum(a) => contributions.push((a, g.expand(&graph.shape(a)))),
        Op::Expand(a) => contributions.push((a, g.sum().reshape(&graph.shape(a)))),
        Op::SumRows(a) => {
            let rows = graph.shape(a)[0];
            contributions.push((a, g.broadcast_rows(rows)));
        }
        Op::BroadcastRows(a) => contributions.push((a, g.sum_rows())),
        Op::Reshape(a) => contributions.push((a, g.reshape(&graph.shape(a)))),
        Op::SliceLast { input, start } => {
            let total = last_dim(graph, input);
            contributions.push((input, g.pad_last(start, total)));
        }
        Op::PadLast { input, start } => {
            let len = last_dim(graph, input);
            contributions.push((input, g.slice_last(start, start + len)));
        }
        Op::ConcatLast(a, b) => {
            let la = last_dim(graph, a);
            let lb = last_dim(graph, b);
            if needs(a) {
                contributions.push((a, g.slice_last(0, la)));
            }
            if needs(b) {
                contributions.push((b, g.slice_last(la, la + lb)));
            }
        }
        Op::Tanh(a) => {
            // d tanh = 1 - y^2, written in terms of the output node
            let y = var(out);
            let local = (-&y.square()).add_scalar(1.0);
            contributions.push((a, g * &local));
        }
        Op::Sigmoid(a) => {
            let y = var(out);
            let local = &y * &(-&y).add_scalar(1.0);
            contributions.push((a, g * &local));
        }
        Op::Softplus(a) => contributions.push((a, g * &var(a).sigmoid())),
        Op::MulConst(a, factor) => contributions.push((a, g.mul_const_shared(factor))),
    }

    contributions.retain(|(input, _)| needs(*input));
    contributions
}

fn last_dim(graph: &Graph, id: NodeId) -> usize {
    graph.shape(id).last().copied().unwrap_or(1)
}
