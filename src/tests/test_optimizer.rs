use ndarray::{array, Array1, Array2};
use crate::optimizer::{Adam, GradientClipper, Optimizer, OptimizerWrapper, RMSProp, SGD};

#[test]
fn test_sgd_update_weights() {
    let mut sgd = SGD::new();
    let mut weights = array![[1.0, 1.0], [1.0, 1.0]];
    let gradients = array![[0.5, 0.25], [0.125, 1.0]];

    sgd.update_weights(0, &mut weights, &gradients, 1.0);

    assert_eq!(weights, array![[0.5, 0.75], [0.875, 0.0]]);
}

#[test]
fn test_sgd_update_biases() {
    let mut sgd = SGD::new();
    let mut biases = array![1.0, 1.0];
    sgd.update_biases(3, &mut biases, &array![0.5, -0.5], 1.0);
    assert_eq!(biases, array![0.5, 1.5]);
}

#[test]
fn test_adam_first_step_moves_by_learning_rate() {
    let mut adam = Adam::default();
    let mut weights = array![[1.0, 1.0], [1.0, 1.0]];
    let gradients = array![[0.1, -0.2], [0.3, -0.4]];

    adam.begin_step();
    adam.update_weights(0, &mut weights, &gradients, 0.01);

    // bias-corrected first step is lr * sign(g)
    let expected = array![[0.99, 1.01], [0.99, 1.01]];
    for (w, e) in weights.iter().zip(expected.iter()) {
        assert!((w - e).abs() < 1e-5, "{} vs {}", w, e);
    }
    assert_eq!(adam.t, 1);
}

#[test]
fn test_adam_slots_are_independent() {
    let mut adam = Adam::default();
    let mut a = array![0.0, 0.0];
    let mut b = array![0.0, 0.0];

    adam.begin_step();
    adam.update_biases(0, &mut a, &array![1.0, 1.0], 0.1);
    adam.update_biases(1, &mut b, &array![-1.0, -1.0], 0.1);
    adam.begin_step();
    adam.update_biases(0, &mut a, &array![1.0, 1.0], 0.1);
    adam.update_biases(1, &mut b, &array![-1.0, -1.0], 0.1);

    // consistent gradients keep moving each slot at full speed
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x + 0.2).abs() < 1e-4);
        assert!((y - 0.2).abs() < 1e-4);
    }
}

#[test]
fn test_adam_reallocates_on_shape_change() {
    let mut adam = Adam::default();
    let mut small: Array2<f32> = Array2::ones((2, 2));
    let mut large: Array2<f32> = Array2::ones((3, 2));

    adam.begin_step();
    adam.update_weights(0, &mut small, &Array2::ones((2, 2)), 0.1);
    adam.begin_step();
    adam.update_weights(0, &mut large, &Array2::ones((3, 2)), 0.1);

    assert!(large.iter().all(|w| w.is_finite() && *w < 1.0));
}

#[test]
fn test_rmsprop_update() {
    let mut rms = RMSProp::new(0.0, 0.0);
    let mut biases: Array1<f32> = array![1.0, 1.0];
    // beta 0 makes v = g^2, so each step is lr * sign(g)
    rms.update_biases(0, &mut biases, &array![4.0, -0.5], 0.25);
    assert_eq!(biases, array![0.75, 1.25]);
}

#[test]
fn test_wrapper_defaults_to_adam() {
    assert!(matches!(OptimizerWrapper::default(), OptimizerWrapper::Adam(_)));

    let mut wrapper = OptimizerWrapper::SGD(SGD::new());
    let mut weights = array![[2.0]];
    wrapper.begin_step();
    wrapper.update_weights(0, &mut weights, &array![[1.0]], 1.0);
    assert_eq!(weights, array![[1.0]]);
}

#[test]
fn test_global_norm_clipping() {
    let mut weights = vec![array![[3.0, 0.0]]];
    let mut biases = vec![array![4.0]];
    let clipper = GradientClipper::from_max_norm(Some(1.0));

    let norm = clipper.clip(&mut weights, &mut biases);

    assert!((norm - 5.0).abs() < 1e-6);
    let clipped = GradientClipper::compute_global_norm(&weights, &biases);
    assert!((clipped - 1.0).abs() < 1e-4);
    // direction is preserved
    assert!((weights[0][[0, 0]] / biases[0][0] - 0.75).abs() < 1e-5);
}

#[test]
fn test_no_clipping_below_bound_or_without_bound() {
    let mut weights = vec![array![[0.3]]];
    let mut biases = vec![array![0.4]];
    let norm = GradientClipper::from_max_norm(Some(1.0)).clip(&mut weights, &mut biases);
    assert!((norm - 0.5).abs() < 1e-6);
    assert_eq!(weights[0], array![[0.3]]);

    let mut weights = vec![array![[30.0]]];
    let mut biases = vec![array![40.0]];
    assert_eq!(GradientClipper::from_max_norm(None), GradientClipper::None);
    GradientClipper::None.clip(&mut weights, &mut biases);
    assert_eq!(biases[0], array![40.0]);
}
