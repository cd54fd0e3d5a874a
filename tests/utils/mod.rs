use std::collections::HashMap;

use chrono::NaiveDate;
use moisture_layers::{DayInput, DayOutput, DaySource, OutputSink, PreprocessError, Result};

/// Serves days from memory, any day not loaded is reported missing.
#[derive(Default)]
pub struct MemorySource {
    days: HashMap<NaiveDate, DayInput>,
}

impl MemorySource {
    pub fn with_day(mut self, date: NaiveDate, input: DayInput) -> Self {
        self.days.insert(date, input);
        self
    }
}

impl DaySource for MemorySource {
    fn load_day(&mut self, date: NaiveDate) -> Result<DayInput> {
        self.days
            .get(&date)
            .cloned()
            .ok_or_else(|| PreprocessError::Source(format!("no data for {}", date)))
    }
}

/// Keeps every output in memory.
#[derive(Default)]
pub struct MemorySink {
    pub outputs: Vec<DayOutput>,
}

impl OutputSink for MemorySink {
    fn write_day(&mut self, output: &DayOutput) -> Result<()> {
        self.outputs.push(output.clone());
        Ok(())
    }
}

pub fn approx_equal(val1: f64, val2: f64, eps: f64) -> bool {
    assert!(eps > 0.0);

    (val1 - val2).abs() < eps
}

#[allow(unused_macros)] // Used by the test files
macro_rules! calm_day_test {
    ($test_name:ident, $variant:expr) => {
        #[test]
        fn $test_name() {
            let mut config = moisture_layers::doctest::test_config();
            config.variant = $variant;
            let geometry = moisture_layers::doctest::test_geometry().unwrap();
            let pre = moisture_layers::Preprocessor::new(config.clone(), geometry).unwrap();

            let out = pre
                .process_day(config.start_date, &moisture_layers::doctest::calm_day(&config))
                .unwrap();

            assert!(out.conservation_error < 1.0e-6);

            // No sources, no sinks, no convergence
            assert!(out.vertical.iter().all(|&f| f == 0.0));

            // Total water stays put at every refined instant
            let total = &out.upper.storage + &out.lower.storage;
            let first = total[[0, 0, 0]];
            assert!(first > 0.0);
            assert!(total.iter().all(|&w| utils::approx_equal(w, first, 1.0e-6 * first)));

            // And so does the split between the layers
            let upper_first = out.upper.storage[[0, 0, 0]];
            assert!(upper_first > 0.0 && upper_first < first);
            assert!(out
                .upper
                .storage
                .iter()
                .all(|&w| utils::approx_equal(w, upper_first, 1.0e-6 * first)));
        }
    };
}
