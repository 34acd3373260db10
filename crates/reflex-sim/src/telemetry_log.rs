//! Telemetry record file.
//!
//! One CSV row per tick: `tick,timestamp_us,` followed by the ten feature
//! names in schema order, with a header row. The offline trainer reads
//! this file to label and fit new models.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use reflex_core::{Feature, FeatureVector};

pub fn header() -> String {
    let mut line = String::from("tick,timestamp_us");
    for feature in Feature::ALL {
        line.push(',');
        line.push_str(feature.name());
    }
    line
}

pub fn write_csv<W: Write>(mut out: W, samples: &[FeatureVector]) -> io::Result<()> {
    writeln!(out, "{}", header())?;
    for sample in samples {
        write!(out, "{},{}", sample.tick(), sample.at().as_micros_f64())?;
        for value in sample.values() {
            write!(out, ",{value}")?;
        }
        writeln!(out)?;
    }
    out.flush()
}

pub fn save_csv(path: &Path, samples: &[FeatureVector]) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(BufWriter::new(file), samples)
}

#[cfg(test)]
mod tests {
    use reflex_core::{FEATURE_COUNT, SimDuration, SimTime};

    use super::*;

    #[test]
    fn header_lists_schema_in_order() {
        let header = header();
        assert!(header.starts_with("tick,timestamp_us,runq_len,arrival_rate,"));
        assert!(header.ends_with(",task_size_var_us2,idle_worker_count"));
        assert_eq!(header.split(',').count(), 2 + FEATURE_COUNT);
    }

    #[test]
    fn one_row_per_sample() {
        let at = SimTime::ZERO + SimDuration::from_millis(500);
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = 3.0;
        values[5] = 0.25;
        let samples = vec![
            FeatureVector::new(1, at, values),
            FeatureVector::new(2, at + SimDuration::from_millis(500), values),
        ];

        let mut out = Vec::new();
        write_csv(&mut out, &samples).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1,500000,3,0,0,0,0,0.25,0,0,0,0");
        assert!(lines[2].starts_with("2,1000000,"));
    }

    #[test]
    fn saves_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");
        save_csv(&path, &[]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), header());
    }
}
