use seawinds::core::gmf::GmfTable;
use seawinds::io::{GmfReader, TableLayout};
use seawinds::types::{MeasType, DTR, TWO_PI};
use std::io::Write;

/// Synthetic stored value for a node of a layout file
fn node_value(met_idx: usize, inc_idx: usize, spd_idx: usize, chi_idx: usize) -> f32 {
    1.0 + met_idx as f32 * 0.5 + inc_idx as f32 * 0.01 + spd_idx as f32 * 0.1 + chi_idx as f32 * 0.001
}

fn layout_bytes(layout: TableLayout) -> Vec<u8> {
    let geometry = layout.geometry();
    let mut bytes = vec![0u8; layout.header_bytes()];
    for met_idx in 0..layout.meas_types().len() {
        for inc_idx in 0..geometry.incidence.count {
            for spd_idx in 0..geometry.speed.count {
                for chi_idx in 0..layout.stored_chi_count() {
                    bytes.extend_from_slice(&node_value(met_idx, inc_idx, spd_idx, chi_idx).to_ne_bytes());
                }
            }
        }
    }
    assert_eq!(bytes.len(), layout.expected_len());
    bytes
}

fn write_table(layout: TableLayout) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(&layout_bytes(layout)).expect("Failed to write table");
    file.flush().expect("Failed to flush table");
    file
}

#[test]
fn test_old_style_file_round_trip() {
    let _ = env_logger::try_init();

    let file = write_table(TableLayout::OldStyle);
    let table = GmfReader::read_table(file.path(), TableLayout::OldStyle).expect("Failed to read table");
    let geometry = *table.geometry();
    assert_eq!(geometry.chi_count, 72);
    assert!(table.contains(MeasType::Vv) && table.contains(MeasType::Hh));
    assert!(!table.contains(MeasType::CBandVv));

    // stored half range is read verbatim
    for &(inc_idx, spd_idx, chi_idx) in &[(0, 1, 0), (12, 20, 17), (25, 50, 36)] {
        let value = table.node_value(MeasType::Hh, inc_idx, spd_idx, chi_idx).unwrap();
        assert_eq!(value, node_value(1, inc_idx, spd_idx, chi_idx));
    }

    // the other half mirrors it
    for chi_idx in 37..72 {
        assert_eq!(
            table.node_value(MeasType::Vv, 3, 7, chi_idx),
            table.node_value(MeasType::Vv, 3, 7, 72 - chi_idx)
        );
    }
    println!("OldStyle table loaded: {:?}", table.meas_types());
}

#[test]
fn test_zero_speed_bin_is_zero_for_every_layout() {
    let _ = env_logger::try_init();

    for layout in [TableLayout::OldStyle, TableLayout::HighWind, TableLayout::CBand] {
        let table = GmfReader::load(layout_bytes(layout).as_slice(), layout).expect("Failed to load table");
        for &met in layout.meas_types() {
            for chi_deg in [0.0, 33.0, 180.0, 301.5] {
                let value = table.interpolate(met, 30.0 * DTR, 0.0, chi_deg * DTR).unwrap();
                assert_eq!(value, 0.0, "{:?} {} not zero at chi {}", layout, met, chi_deg);
            }
        }
    }
}

#[test]
fn test_lookup_wraps_in_chi() {
    let table = GmfReader::load(layout_bytes(TableLayout::CBand).as_slice(), TableLayout::CBand).unwrap();
    for chi_deg in [0.0, 2.5, 91.0, 179.9, 270.0, 359.0] {
        let chi = chi_deg * DTR;
        let base = table.interpolate(MeasType::CBandHh, 35.0 * DTR, 12.3, chi).unwrap();
        let wrapped = table.interpolate(MeasType::CBandHh, 35.0 * DTR, 12.3, chi + TWO_PI).unwrap();
        let negative = table.interpolate(MeasType::CBandHh, 35.0 * DTR, 12.3, chi - TWO_PI).unwrap();
        assert!((base - wrapped).abs() < 1e-9);
        assert!((base - negative).abs() < 1e-9);
    }
}

#[test]
fn test_ku_and_c_tables_share_geometry() {
    let ku = write_table(TableLayout::OldStyle);
    let c_band = write_table(TableLayout::CBand);
    let table = GmfReader::read_ku_and_c(ku.path(), c_band.path()).expect("Failed to read Ku/C tables");

    assert_eq!(
        table.meas_types(),
        vec![MeasType::Vv, MeasType::Hh, MeasType::CBandVv, MeasType::CBandHh]
    );
    // both files use slot-relative values, so matching slots hold equal nodes
    assert_eq!(
        table.node_value(MeasType::Vv, 4, 9, 5),
        table.node_value(MeasType::CBandVv, 4, 9, 5)
    );
}

#[test]
fn test_grid_nodes_interpolate_exactly() {
    let table = GmfReader::load(layout_bytes(TableLayout::OldStyle).as_slice(), TableLayout::OldStyle).unwrap();
    let geometry = *table.geometry();
    for inc_idx in [0, 5, 25] {
        for spd_idx in [1, 10, 50] {
            for chi_idx in [0, 13, 36, 50, 71] {
                let stored = table.node_value(MeasType::Vv, inc_idx, spd_idx, chi_idx).unwrap() as f64;
                let looked_up = table
                    .interpolate(
                        MeasType::Vv,
                        geometry.incidence.value(inc_idx),
                        geometry.speed.value(spd_idx),
                        chi_idx as f64 * geometry.chi_step(),
                    )
                    .unwrap();
                assert!((looked_up - stored).abs() < 1e-5);
            }
        }
    }
}

#[test]
fn test_truncated_file_is_rejected() {
    let mut bytes = layout_bytes(TableLayout::OldStyle);
    bytes.truncate(bytes.len() / 2);
    let result = GmfReader::load(bytes.as_slice(), TableLayout::OldStyle);
    assert!(result.is_err());
}

#[test]
fn test_synthetic_table_harmonics() {
    let geometry = TableLayout::Polarimetric.geometry();
    let table = GmfTable::from_fn(geometry, &[MeasType::Vh], |_, _, spd, chi| {
        0.001 * spd * (1.0 + 0.3 * (2.0 * chi).cos())
    })
    .unwrap();
    let coefs = table.harmonic_coefficients(MeasType::Vh, 45.0 * DTR, 10.0).unwrap();
    assert!((coefs.a0 - 0.01).abs() < 1e-6);
    assert!(coefs.amplitude[0] < 1e-6);
    assert!((coefs.amplitude[1] - 0.003).abs() < 1e-6);
    assert!(table.harmonic_coefficients(MeasType::Vv, 45.0 * DTR, 10.0).is_err());
}

#[test]
fn test_polarimetric_layout_is_headerless_and_full_range() {
    let _ = env_logger::try_init();

    let layout = TableLayout::Polarimetric;
    let table = GmfReader::load(layout_bytes(layout).as_slice(), layout).expect("Failed to load table");
    assert_eq!(table.meas_types(), layout.meas_types().to_vec());
    assert_eq!(table.geometry().chi_count, 360);

    // no record header, so rows start at byte zero
    for (met_idx, &met) in layout.meas_types().iter().enumerate() {
        assert_eq!(table.node_value(met, 0, 1, 0).unwrap(), node_value(met_idx, 0, 1, 0));
        assert_eq!(table.node_value(met, 20, 500, 359).unwrap(), node_value(met_idx, 20, 500, 359));
    }

    // chi beyond 180 degrees is stored, not mirrored
    for chi_idx in [181, 200, 270, 359] {
        let stored = table.node_value(MeasType::VvHvCorr, 7, 42, chi_idx).unwrap();
        assert_eq!(stored, node_value(4, 7, 42, chi_idx));
        assert_ne!(stored, node_value(4, 7, 42, 360 - chi_idx));
    }

    for &met in layout.meas_types() {
        let value = table.interpolate(met, 45.0 * DTR, 0.0, 123.0 * DTR).unwrap();
        assert_eq!(value, 0.0, "{} not zero at zero speed", met);
    }
}
