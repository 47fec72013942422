/// Full-batch gradient descent with Armijo backtracking.
///
/// `objective` returns the loss and its gradient at a point. The step shrinks
/// by half until the sufficient-decrease condition holds and grows again after
/// every accepted step. Stops when the gradient's max-norm drops below `tol`,
/// when no step decreases the loss, or after `max_iter` accepted steps.
/// Returns the number of iterations performed.
pub(crate) fn minimize<F>(x: &mut [f64], max_iter: usize, tol: f64, mut objective: F) -> usize
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
{
    const ARMIJO: f64 = 1e-4;
    const MIN_STEP: f64 = 1e-12;

    let (mut loss, mut grad) = objective(x);
    let mut step = 1.0;
    let mut candidate = vec![0.0; x.len()];

    for iter in 0..max_iter {
        let grad_norm = grad.iter().fold(0.0f64, |m, g| m.max(g.abs()));
        if grad_norm < tol {
            return iter;
        }
        let grad_sq: f64 = grad.iter().map(|g| g * g).sum();

        loop {
            for ((c, &xi), &gi) in candidate.iter_mut().zip(x.iter()).zip(&grad) {
                *c = xi - step * gi;
            }
            let (new_loss, new_grad) = objective(&candidate);
            if new_loss <= loss - ARMIJO * step * grad_sq {
                x.copy_from_slice(&candidate);
                loss = new_loss;
                grad = new_grad;
                step *= 2.0;
                break;
            }
            step *= 0.5;
            if step < MIN_STEP {
                return iter;
            }
        }
    }
    max_iter
}
