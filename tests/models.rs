use approx::assert_relative_eq;
use epimeta::prelude::*;
use epimeta::{ParameterError, SolveError};
use ndarray::array;

fn grid(n: usize) -> Vec<f64> {
    (0..=n).map(|t| t as f64).collect()
}

fn sir() -> ClassicModel {
    let mut model = ClassicModel::sir().unwrap();
    model
        .set_params(epimeta::params! { "beta" => 0.2, "gamma" => 0.1, "n" => 1000.0 })
        .unwrap();
    model.set_initial_value(0.0, vec![999.0, 1.0, 0.0]);
    model
}

#[test]
fn sir_epidemic_peaks_and_keeps_its_population() {
    let mut model = sir();
    model.solve((0.0, 160.0), Some(&grid(160))).unwrap();
    let infected = model.extract_series("i").unwrap();
    assert_eq!(infected.labels, ["Infected"]);
    assert_eq!(infected.times.len(), 161);

    let column = infected.column("Infected").unwrap();
    let (peak, _) = column
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |best, (k, &v)| if v > best.1 { (k, v) } else { best });
    assert!(peak > 0 && peak < 160, "peak at {}", peak);

    let all = model.extract_series("all").unwrap();
    for row in all.values.rows() {
        assert_relative_eq!(row.sum(), 1000.0, max_relative = 1e-3);
    }
}

#[test]
fn rejected_parameters_block_solving() {
    let mut model = sir();
    let err = model.set_params([0.2, 0.1]).unwrap_err();
    assert!(matches!(
        err,
        EpiError::Parameter(ParameterError::CountMismatch { expected: 3, found: 2 })
    ));
    assert!(!model.has_valid_params());
    assert!(matches!(
        model.solve((0.0, 10.0), None),
        Err(EpiError::InvalidParameters { .. })
    ));

    let err = model
        .set_params(epimeta::params! { "beta" => 0.2, "gamma" => 0.1 })
        .unwrap_err();
    assert!(matches!(
        err,
        EpiError::Parameter(ParameterError::MissingKey { .. })
    ));

    let err = model.set_params([0.2, f64::NAN, 1000.0]).unwrap_err();
    assert!(matches!(
        err,
        EpiError::Parameter(ParameterError::NonFinite { .. })
    ));

    model.set_params([0.2, 0.1, 1000.0]).unwrap();
    assert!(model.solve((0.0, 10.0), None).is_ok());
}

#[test]
fn solving_with_invalid_parameters_drops_the_previous_result() {
    let mut model = sir();
    model.solve((0.0, 10.0), None).unwrap();
    assert!(model.result().is_ok());

    assert!(model.set_params([0.2, 0.1]).is_err());
    assert!(matches!(
        model.solve((0.0, 10.0), None),
        Err(EpiError::InvalidParameters { .. })
    ));
    assert!(matches!(model.result(), Err(EpiError::NotSolved { .. })));
    assert!(model.to_string().contains("solved: no"));
}

#[test]
fn solves_at_every_step_or_on_a_two_point_grid() {
    let mut model = sir();
    let steps = model.solve((0.0, 160.0), None).unwrap();
    assert!(steps.len() > 2);
    assert_eq!(steps.times()[0], 0.0);
    assert_relative_eq!(*steps.times().last().unwrap(), 160.0, epsilon = 1e-9);
    assert!(steps.times().windows(2).all(|w| w[0] < w[1]));
    let last = steps.state(steps.len() - 1).to_vec();

    let ends = model.solve((0.0, 160.0), Some(&[0.0, 160.0])).unwrap();
    assert_eq!(ends.times(), [0.0, 160.0]);
    assert_eq!(ends.state(0).to_vec(), vec![999.0, 1.0, 0.0]);
    for (a, b) in ends.state(1).iter().zip(&last) {
        assert_relative_eq!(*a, *b, max_relative = 1e-4, epsilon = 1e-3);
    }
}

#[test]
fn results_are_only_available_after_solving() {
    let mut model = sir();
    assert!(matches!(model.result(), Err(EpiError::NotSolved { .. })));
    assert!(matches!(
        model.extract_series("all"),
        Err(EpiError::NotSolved { .. })
    ));
    model.solve((0.0, 10.0), None).unwrap();
    assert!(model.result().is_ok());
}

#[test]
fn unknown_modes_are_rejected() {
    let mut model = sir();
    model.solve((0.0, 10.0), None).unwrap();
    for mode in ["x", "i-1", "i-all", "q-2"] {
        assert!(
            matches!(model.extract_series(mode), Err(EpiError::InvalidMode { .. })),
            "{}",
            mode
        );
    }

    let mut model = EulerianModel::sir(2).unwrap();
    model
        .set_params(vec![
            ParamValue::from(array![[0.0, 0.1], [0.1, 0.0]]),
            vec![0.2, 0.2].into(),
            vec![0.1, 0.1].into(),
        ])
        .unwrap();
    model.set_initial_value(0.0, vec![99.0, 100.0, 1.0, 0.0, 0.0, 0.0, 100.0, 100.0]);
    model.solve((0.0, 10.0), None).unwrap();
    for mode in ["i-0", "i-3", "i-one"] {
        assert!(
            matches!(model.extract_series(mode), Err(EpiError::InvalidMode { .. })),
            "{}",
            mode
        );
    }
    let nodes = model.extract_series("I-all").unwrap();
    assert_eq!(nodes.labels, ["Infected 1", "Infected 2"]);
    let second = model.extract_series("i-2").unwrap();
    assert_eq!(second.values.column(0), nodes.values.column(1));
}

#[test]
fn missing_initial_value_is_reported() {
    let mut model = ClassicModel::sir().unwrap();
    model.set_params([0.2, 0.1, 1000.0]).unwrap();
    assert!(matches!(
        model.solve((0.0, 10.0), None),
        Err(EpiError::MissingInitialValue { .. })
    ));
}

#[test]
fn wrong_initial_state_length_is_a_solve_error() {
    let mut model = sir();
    model.set_initial_value(0.0, vec![999.0, 1.0]);
    assert!(matches!(
        model.solve((0.0, 10.0), None),
        Err(EpiError::Solve {
            cause: SolveError::StateLength { expected: 3, found: 2 },
            ..
        })
    ));
}

#[test]
fn symmetric_nodes_share_one_trajectory() {
    let mut model = EulerianModel::sir(2).unwrap();
    model
        .set_params(vec![
            ParamValue::from(array![[0.0, 0.05], [0.05, 0.0]]),
            vec![0.3, 0.3].into(),
            vec![0.1, 0.1].into(),
        ])
        .unwrap();
    model.set_initial_value(0.0, vec![495.0, 495.0, 5.0, 5.0, 0.0, 0.0, 500.0, 500.0]);
    model.solve((0.0, 100.0), Some(&grid(100))).unwrap();
    for code in ["s", "i", "r", "n"] {
        let series = model.extract_series(&format!("{}-all", code)).unwrap();
        for row in series.values.rows() {
            assert_relative_eq!(row[0], row[1], max_relative = 1e-9);
        }
    }
}

#[test]
fn empty_population_is_a_domain_error_and_clears_the_result() {
    let mut model = ClassicModel::new(Disease::Sir, Population::Dynamic).unwrap();
    model.set_params([0.2, 0.1]).unwrap();
    model.set_initial_value(0.0, vec![999.0, 1.0, 0.0]);
    model.solve((0.0, 10.0), None).unwrap();
    assert!(model.result().is_ok());

    model.set_initial_value(0.0, vec![0.0, 0.0, 0.0]);
    assert!(matches!(
        model.solve((0.0, 10.0), None),
        Err(EpiError::Domain { what: "population", .. })
    ));
    assert!(matches!(model.result(), Err(EpiError::NotSolved { .. })));

    let mut model = EulerianModel::sir(2).unwrap();
    model
        .set_params(vec![
            ParamValue::from(array![[0.0, 0.0], [0.0, 0.0]]),
            vec![0.2, 0.2].into(),
            vec![0.1, 0.1].into(),
        ])
        .unwrap();
    model.set_initial_value(0.0, vec![99.0, 0.0, 1.0, 0.0, 0.0, 0.0, 100.0, 0.0]);
    assert!(matches!(
        model.solve((0.0, 10.0), None),
        Err(EpiError::Domain { node: 1, .. })
    ));
}

#[test]
fn structural_errors_are_reported() {
    assert!(matches!(
        EulerianModel::sir(1),
        Err(EpiError::Structure(_))
    ));
    assert!(matches!(
        LagrangianModel::flux(0),
        Err(EpiError::Structure(_))
    ));
}

#[test]
fn summary_describes_the_model() {
    let mut model = sir();
    let before = model.to_string();
    assert!(before.starts_with("SIR model"));
    assert!(before.contains("Susceptible (s)"));
    assert!(before.contains("beta = 0.2"));
    assert!(before.contains("solved: no"));

    model.solve((0.0, 10.0), Some(&grid(10))).unwrap();
    assert!(model.to_string().contains("solved: 11 time points"));

    let unset = LagrangianModel::sis(2).unwrap().to_string();
    assert!(unset.contains("(not set)"));
    assert!(unset.contains("initial value: not set"));
}

#[test]
fn simulate_leaves_the_model_untouched() {
    let model = sir();
    let params = model.parse_params([0.5, 0.1, 1000.0]).unwrap();
    let faster = model.simulate(&params, (0.0, 20.0), Some(&grid(20))).unwrap();
    let slower = model
        .simulate(model.params().unwrap(), (0.0, 20.0), Some(&grid(20)))
        .unwrap();
    assert!(faster.state(20)[1] > slower.state(20)[1]);
    assert!(matches!(model.result(), Err(EpiError::NotSolved { .. })));
    assert_relative_eq!(model.params().unwrap().beta, 0.2);
}
