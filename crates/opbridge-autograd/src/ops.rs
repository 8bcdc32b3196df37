//! Differentiable Operations
//!
//! Each function computes its result on the input tensors and, when any input
//! tracks gradients and gradient mode is on, records the matching gradient
//! function in `graph`.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use opbridge_core::{Extremum, Result};

use crate::functions::{
    AddBackward, ExtremumBackward, LeakyReluBackward, MulBackward, NegBackward, ReluBackward,
    SubBackward, SumBackward, SumDimBackward, TransposeBackward,
};
use crate::graph::Graph;
use crate::variable::Variable;

// =============================================================================
// Arithmetic
// =============================================================================

/// `lhs + alpha * rhs` with broadcasting.
pub fn add(graph: &mut Graph, lhs: &Variable, rhs: &Variable, alpha: f64) -> Result<Variable> {
    let data = lhs.data().add(&rhs.data().scale(alpha)?)?;
    let grad_fn = AddBackward::new(alpha, lhs.shape().to_vec(), rhs.shape().to_vec());
    Ok(graph.output(data, grad_fn, &[lhs, rhs]))
}

/// `lhs - alpha * rhs` with broadcasting.
pub fn sub(graph: &mut Graph, lhs: &Variable, rhs: &Variable, alpha: f64) -> Result<Variable> {
    let data = lhs.data().sub(&rhs.data().scale(alpha)?)?;
    let grad_fn = SubBackward::new(alpha, lhs.shape().to_vec(), rhs.shape().to_vec());
    Ok(graph.output(data, grad_fn, &[lhs, rhs]))
}

/// Element-wise product with broadcasting.
pub fn mul(graph: &mut Graph, lhs: &Variable, rhs: &Variable) -> Result<Variable> {
    let data = lhs.data().mul(rhs.data())?;
    let grad_fn = MulBackward::new(lhs.data().clone(), rhs.data().clone());
    Ok(graph.output(data, grad_fn, &[lhs, rhs]))
}

/// Element-wise negation.
pub fn neg(graph: &mut Graph, input: &Variable) -> Result<Variable> {
    let data = input.data().neg()?;
    Ok(graph.output(data, NegBackward, &[input]))
}

// =============================================================================
// Activations
// =============================================================================

/// Rectified linear unit.
pub fn relu(graph: &mut Graph, input: &Variable) -> Result<Variable> {
    let data = input.data().leaky_relu(0.0)?;
    let grad_fn = ReluBackward::new(input.data().clone());
    Ok(graph.output(data, grad_fn, &[input]))
}

/// Leaky rectified linear unit.
pub fn leaky_relu(graph: &mut Graph, input: &Variable, negative_slope: f64) -> Result<Variable> {
    let data = input.data().leaky_relu(negative_slope)?;
    let grad_fn = LeakyReluBackward::new(input.data().clone(), negative_slope);
    Ok(graph.output(data, grad_fn, &[input]))
}

// =============================================================================
// Reductions and Layout
// =============================================================================

/// Sum of all elements as a 0-d tensor.
pub fn sum(graph: &mut Graph, input: &Variable) -> Result<Variable> {
    let data = input.data().sum()?;
    let grad_fn = SumBackward::new(input.shape().to_vec());
    Ok(graph.output(data, grad_fn, &[input]))
}

/// Sum over `dims` (already normalized); an empty list reduces everything.
pub fn sum_dims(
    graph: &mut Graph,
    input: &Variable,
    dims: &[usize],
    keepdim: bool,
) -> Result<Variable> {
    let data = input.data().sum_dims(dims, keepdim)?;
    let grad_fn = SumDimBackward::new(input.shape().to_vec(), dims.to_vec());
    Ok(graph.output(data, grad_fn, &[input]))
}

/// Swaps two (already normalized) dimensions.
pub fn transpose(graph: &mut Graph, input: &Variable, dim0: usize, dim1: usize) -> Result<Variable> {
    let data = input.data().transpose(dim0, dim1)?;
    Ok(graph.output(data, TransposeBackward::new(dim0, dim1), &[input]))
}

/// Minimum and maximum of all elements, each as a 0-d tensor.
///
/// Each output gets its own node, both with an edge to `input`.
pub fn aminmax(graph: &mut Graph, input: &Variable) -> Result<(Variable, Variable)> {
    let (min, min_index) = input.data().extremum(Extremum::Min)?;
    let (max, max_index) = input.data().extremum(Extremum::Max)?;
    let min = graph.output(
        min,
        ExtremumBackward::new(Extremum::Min, input.data().clone(), min_index),
        &[input],
    );
    let max = graph.output(
        max,
        ExtremumBackward::new(Extremum::Max, input.data().clone(), max_index),
        &[input],
    );
    Ok((min, max))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use opbridge_core::Tensor;

    fn var(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Variable {
        Variable::new(Tensor::from_vec(data, shape).unwrap(), requires_grad)
    }

    #[test]
    fn test_add_with_alpha() {
        let mut graph = Graph::new();
        let a = var(vec![1.0, 2.0], &[2], true);
        let b = var(vec![10.0, 20.0], &[2], false);
        let c = add(&mut graph, &a, &b, 0.5).unwrap();
        assert_eq!(c.data().to_vec::<f32>().unwrap(), vec![6.0, 12.0]);

        let node = graph.node(c.grad_fn().unwrap()).unwrap();
        assert_eq!(node.name(), "AddBackward");
        assert!(node.next_edges()[0].is_some());
        assert!(node.next_edges()[1].is_none());
    }

    #[test]
    fn test_chain_links_nodes() {
        let mut graph = Graph::new();
        let a = var(vec![-1.0, 2.0], &[2], true);
        let r = relu(&mut graph, &a).unwrap();
        let s = sum(&mut graph, &r).unwrap();
        assert_eq!(s.data().item::<f32>().unwrap(), 2.0);

        let sum_node = graph.node(s.grad_fn().unwrap()).unwrap();
        assert_eq!(sum_node.next_edges(), &[r.grad_fn()]);
    }

    #[test]
    fn test_aminmax_records_two_nodes() {
        let mut graph = Graph::new();
        let a = var(vec![3.0, -1.0, 5.0], &[3], true);
        let (min, max) = aminmax(&mut graph, &a).unwrap();
        assert_eq!(min.data().item::<f32>().unwrap(), -1.0);
        assert_eq!(max.data().item::<f32>().unwrap(), 5.0);
        assert_ne!(min.grad_fn(), max.grad_fn());
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_sum_dims_and_transpose_shapes() {
        let mut graph = Graph::new();
        let a = var(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], true);
        let t = transpose(&mut graph, &a, 0, 1).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        let s = sum_dims(&mut graph, &t, &[1], true).unwrap();
        assert_eq!(s.shape(), &[3, 1]);
        assert_eq!(s.data().to_vec::<f32>().unwrap(), vec![5.0, 7.0, 9.0]);
    }
}
