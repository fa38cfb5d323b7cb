//! End-to-end scenarios against the public [`csx::Matrix`] facade.

use csx::config::{Config, OptionValue};
use csx::csr::CsrMatrix;
use csx::vector::Vector;
use csx::Matrix;

fn multiply(csr: CsrMatrix, config: &Config) -> Vec<csx::Value> {
    let nr_cols = csr.nr_cols();
    let matrix = Matrix::from_csr(csr, config).unwrap();
    let x = Vector::from_vec((1..=nr_cols).map(|v| v as csx::Value).collect());
    let mut y = Vector::zeros(matrix.nr_rows());
    matrix.multiply(&x, &mut y).unwrap();
    y.as_slice().to_vec()
}

#[test]
fn identity_matrix_is_a_no_op() {
    let csr = CsrMatrix::from_triples(3, 3, vec![(1, 1, 1.0), (2, 2, 1.0), (3, 3, 1.0)]).unwrap();
    let y = multiply(csr, &Config::default());
    assert_eq!(y, vec![1.0, 2.0, 3.0]);
}

#[test]
fn tridiagonal_matrix_matches_expected_result() {
    let mut triples = Vec::new();
    for i in 1..=5 {
        triples.push((i, i, 2.0));
    }
    for i in 1..5 {
        triples.push((i, i + 1, -1.0));
        triples.push((i + 1, i, -1.0));
    }
    let csr = CsrMatrix::from_triples(5, 5, triples).unwrap();
    let mut config = Config::default();
    config.set("matrix.preproc.xform", OptionValue::Str("h".into()));
    let x = Vector::from_vec(vec![1.0, 1.0, 1.0, 1.0, 1.0]);
    let matrix = Matrix::from_csr(csr, &config).unwrap();
    let mut y = Vector::zeros(5);
    matrix.multiply(&x, &mut y).unwrap();
    assert_eq!(y.as_slice(), &[1.0, 0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn ten_by_ten_matches_dense_reference_within_tolerance() {
    let mut triples = Vec::new();
    for i in 1..=10 {
        triples.push((i, i, i as f32));
        if i < 10 {
            triples.push((i, i + 1, 1.0));
        }
        if i > 1 {
            triples.push((i, i - 1, 0.5));
        }
    }
    let csr = CsrMatrix::from_triples(10, 10, triples).unwrap();
    let x: Vec<csx::Value> = (1..=10).map(|v| v as csx::Value).collect();
    let reference = csr.spmv_reference(&x);

    let matrix = Matrix::from_csr(csr, &Config::default()).unwrap();
    let xv = Vector::from_vec(x);
    let mut y = Vector::zeros(10);
    matrix.multiply(&xv, &mut y).unwrap();

    for (&got, &want) in y.as_slice().iter().zip(reference.iter()) {
        assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
    }
}

#[test]
fn symmetric_4x4_matches_expected_result() {
    let csr = CsrMatrix::from_triples(
        4,
        4,
        vec![
            (1, 1, 2.0),
            (2, 1, 1.0),
            (2, 2, 2.0),
            (3, 2, 1.0),
            (3, 3, 2.0),
            (4, 3, 1.0),
            (4, 4, 2.0),
            // mirrored upper-triangle entries, since MMF symmetric storage
            // is ingested as a lower triangle and the engine reflects it.
            (1, 2, 1.0),
            (2, 3, 1.0),
            (3, 4, 1.0),
        ],
    )
    .unwrap();
    let mut config = Config::default();
    config.set("matrix.symmetric", OptionValue::Bool(true));
    let x = Vector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
    let matrix = Matrix::from_csr(csr, &config).unwrap();
    let mut y = Vector::zeros(4);
    matrix.multiply(&x, &mut y).unwrap();
    assert_eq!(y.as_slice(), &[4.0, 8.0, 12.0, 11.0]);
}

#[test]
fn all_ones_matrix_round_trips_through_save_and_restore() {
    let mut triples = Vec::new();
    for r in 1..=100 {
        for c in 1..=100 {
            triples.push((r, c, 1.0));
        }
    }
    let csr = CsrMatrix::from_triples(100, 100, triples).unwrap();
    let mut config = Config::default();
    config.set("matrix.preproc.xform", OptionValue::Str("h".into()));
    let matrix = Matrix::from_csr(csr, &config).unwrap();

    let dir = std::env::temp_dir();
    let path = dir.join(format!("csx-roundtrip-{}.bin", std::process::id()));
    matrix.save(&path).unwrap();
    let restored = Matrix::load(&path, &Config::default()).unwrap();
    std::fs::remove_file(&path).ok();

    let x = Vector::from_vec((1..=100).map(|v| v as csx::Value).collect());
    let mut y = Vector::zeros(100);
    restored.multiply(&x, &mut y).unwrap();
    for &v in y.as_slice() {
        assert_eq!(v, 5050.0);
    }
}

#[test]
fn auto_search_matches_explicit_horizontal_on_a_dense_block() {
    // P1: every option combination must agree with the dense reference,
    // so explicit and auto-search encodings are cross-checked here.
    let mut triples = Vec::new();
    for r in 1..=6 {
        for c in 1..=6 {
            triples.push((r, c, ((r + c) % 5 + 1) as f32));
        }
    }
    let x: Vec<csx::Value> = (1..=6).map(|v| v as csx::Value).collect();

    let csr_explicit = CsrMatrix::from_triples(6, 6, triples.clone()).unwrap();
    let mut explicit_cfg = Config::default();
    explicit_cfg.set("matrix.preproc.xform", OptionValue::Str("h".into()));
    let explicit = multiply(csr_explicit, &explicit_cfg);

    let csr_auto = CsrMatrix::from_triples(6, 6, triples).unwrap();
    let auto = multiply(csr_auto, &Config::default());

    let reference = CsrMatrix::from_triples(
        6,
        6,
        (1..=6)
            .flat_map(|r| (1..=6).map(move |c| (r, c, ((r + c) % 5 + 1) as f32)))
            .collect(),
    )
    .unwrap()
    .spmv_reference(&x);

    for i in 0..6 {
        assert!((explicit[i] - reference[i]).abs() < 1e-6);
        assert!((auto[i] - reference[i]).abs() < 1e-6);
    }
}

#[test]
fn multi_threaded_build_balances_rows_by_nonzero_count() {
    // P6: partitioning balance — max/min nnz per worker differ by at most
    // one row's worth of nonzeros.
    let rowptr: Vec<usize> = (0..=8).map(|i| i * 3).collect(); // 8 rows, 3 nnz each
    let splits = csx::build::split_rows_by_nnz(&rowptr, 4);
    let loads: Vec<usize> = splits.windows(2).map(|w| rowptr[w[1]] - rowptr[w[0]]).collect();
    let max_row_nnz = 3;
    assert!(loads.iter().max().unwrap() - loads.iter().min().unwrap() <= max_row_nnz);
}
