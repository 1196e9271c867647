use crate::core::gmf::{GmfTable, TableAxis, TableGeometry};
use crate::types::{MeasType, WindError, WindResult, DTR};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Legacy binary GMF file layouts.
///
/// Every layout is a raw array of native-endian `f32` read with the
/// measurement type outermost, then incidence, speed and chi innermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableLayout {
    /// Ku-band VV/HH, 26 incidence x 51 speed, half-range chi at 5 degrees
    OldStyle,
    /// Ku-band VV/HH extended to 99 m/s
    HighWind,
    /// C-band VV/HH on the old-style grid
    CBand,
    /// Full polarimetric table, 21 incidence x 501 speed x 360 chi
    Polarimetric,
}

impl TableLayout {
    pub fn geometry(&self) -> TableGeometry {
        match self {
            TableLayout::OldStyle | TableLayout::CBand => TableGeometry {
                incidence: TableAxis::new(26, 16.0 * DTR, 2.0 * DTR),
                speed: TableAxis::new(51, 0.0, 1.0),
                chi_count: 72,
            },
            TableLayout::HighWind => TableGeometry {
                incidence: TableAxis::new(26, 16.0 * DTR, 2.0 * DTR),
                speed: TableAxis::new(100, 0.0, 1.0),
                chi_count: 72,
            },
            TableLayout::Polarimetric => TableGeometry {
                incidence: TableAxis::new(21, 40.0 * DTR, 1.0 * DTR),
                speed: TableAxis::new(501, 0.0, 0.1),
                chi_count: 360,
            },
        }
    }

    /// Measurement types in file order
    pub fn meas_types(&self) -> &'static [MeasType] {
        match self {
            TableLayout::OldStyle | TableLayout::HighWind => &[MeasType::Vv, MeasType::Hh],
            TableLayout::CBand => &[MeasType::CBandVv, MeasType::CBandHh],
            TableLayout::Polarimetric => &[
                MeasType::Vv,
                MeasType::Hh,
                MeasType::Vh,
                MeasType::Hv,
                MeasType::VvHvCorr,
                MeasType::HhVhCorr,
            ],
        }
    }

    /// Chi samples stored per row in the file
    pub fn stored_chi_count(&self) -> usize {
        if self.is_mirrored() {
            // 0 to 180 degrees inclusive
            self.geometry().chi_count / 2 + 1
        } else {
            self.geometry().chi_count
        }
    }

    /// True when the file holds half the chi range
    pub fn is_mirrored(&self) -> bool {
        !matches!(self, TableLayout::Polarimetric)
    }

    /// Leading record-length bytes to discard
    pub fn header_bytes(&self) -> usize {
        match self {
            TableLayout::Polarimetric => 0,
            _ => 4,
        }
    }

    /// Number of bytes the layout needs, header included
    pub fn expected_len(&self) -> usize {
        let geometry = self.geometry();
        let values = self.meas_types().len()
            * geometry.incidence.count
            * geometry.speed.count
            * self.stored_chi_count();
        self.header_bytes() + values * std::mem::size_of::<f32>()
    }
}

/// GMF table file reader
pub struct GmfReader;

impl GmfReader {
    /// Read a GMF table file in the given layout
    pub fn read_table<P: AsRef<Path>>(path: P, layout: TableLayout) -> WindResult<GmfTable> {
        log::info!(
            "Reading {:?} GMF table from: {}",
            layout,
            path.as_ref().display()
        );
        let file = File::open(path.as_ref())?;
        Self::load(BufReader::new(file), layout)
    }

    /// Populate a table from any byte stream
    pub fn load<R: Read>(source: R, layout: TableLayout) -> WindResult<GmfTable> {
        let mut table = GmfTable::new(layout.geometry(), layout.meas_types())?;
        Self::fill(&mut table, source, layout)?;
        table.zero_speed_bin();
        Ok(table)
    }

    /// Read co-registered Ku-band (old style) and C-band tables into
    /// disjoint measurement-type slots of one table
    pub fn read_ku_and_c<P: AsRef<Path>, Q: AsRef<Path>>(ku_path: P, c_path: Q) -> WindResult<GmfTable> {
        log::info!(
            "Reading Ku/C GMF tables from: {} and {}",
            ku_path.as_ref().display(),
            c_path.as_ref().display()
        );
        let ku_file = BufReader::new(File::open(ku_path.as_ref())?);
        let c_file = BufReader::new(File::open(c_path.as_ref())?);
        Self::load_ku_and_c(ku_file, c_file)
    }

    /// Stream variant of [`GmfReader::read_ku_and_c`]
    pub fn load_ku_and_c<R: Read, S: Read>(ku_source: R, c_source: S) -> WindResult<GmfTable> {
        let ku = TableLayout::OldStyle;
        let c_band = TableLayout::CBand;
        if ku.geometry() != c_band.geometry() {
            return Err(WindError::InvalidTable(
                "Ku and C band layouts are not co-registered".to_string(),
            ));
        }

        let meas_types: Vec<MeasType> = ku
            .meas_types()
            .iter()
            .chain(c_band.meas_types())
            .copied()
            .collect();
        let mut table = GmfTable::new(ku.geometry(), &meas_types)?;
        Self::fill(&mut table, ku_source, ku)?;
        Self::fill(&mut table, c_source, c_band)?;
        table.zero_speed_bin();
        Ok(table)
    }

    /// Decode one layout's rows into the matching slots of `table`
    fn fill<R: Read>(table: &mut GmfTable, mut source: R, layout: TableLayout) -> WindResult<()> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;

        let expected = layout.expected_len();
        if bytes.len() < expected {
            return Err(WindError::TableLoad(format!(
                "{:?} table truncated: {} bytes, expected {}",
                layout,
                bytes.len(),
                expected
            )));
        }
        if bytes.len() > expected {
            log::warn!(
                "{:?} table has {} trailing bytes, ignoring",
                layout,
                bytes.len() - expected
            );
        }

        let values: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes[layout.header_bytes()..expected]);
        let geometry = layout.geometry();
        let stored_chi = layout.stored_chi_count();

        let mut rows = values.chunks_exact(stored_chi);
        for &met in layout.meas_types() {
            for inc_idx in 0..geometry.incidence.count {
                for spd_idx in 0..geometry.speed.count {
                    let row = rows.next().ok_or_else(|| {
                        WindError::TableLoad(format!("{:?} table ended early", layout))
                    })?;
                    let mut target = table.chi_row_mut(met, inc_idx, spd_idx).ok_or_else(|| {
                        WindError::InvalidTable(format!("Table has no slot for {}", met))
                    })?;
                    for (chi_idx, value) in row.iter().enumerate() {
                        target[chi_idx] = *value;
                    }
                }
            }
        }

        if layout.is_mirrored() {
            table.mirror_chi(stored_chi);
        }

        log::debug!(
            "Loaded {:?} table: {} values for {:?}",
            layout,
            values.len(),
            layout.meas_types()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(TableLayout::OldStyle.stored_chi_count(), 37);
        assert_eq!(TableLayout::OldStyle.expected_len(), 4 + 2 * 26 * 51 * 37 * 4);
        assert_eq!(TableLayout::Polarimetric.stored_chi_count(), 360);
        assert_eq!(TableLayout::HighWind.geometry().speed.count, 100);
    }

    #[test]
    fn test_truncated_stream_fails() {
        let bytes = vec![0u8; TableLayout::CBand.expected_len() - 4];
        let result = GmfReader::load(bytes.as_slice(), TableLayout::CBand);
        assert!(matches!(result, Err(WindError::TableLoad(_))));
    }

    #[test]
    fn test_missing_file_fails() {
        let result = GmfReader::read_table("/nonexistent/gmf.dat", TableLayout::OldStyle);
        assert!(matches!(result, Err(WindError::Io(_))));
    }
}
