use moisture_layers::{
    build_columns, doctest, Columns, DayInput, GridGeometry, PreprocessConfig, Variant,
};

pub const NLAT: usize = 20;
pub const NLON: usize = 30;
pub const NLEV: usize = 25;

pub fn config(variant: Variant) -> PreprocessConfig {
    let mut config = PreprocessConfig::default();
    config.variant = variant;
    config
}

pub fn geometry() -> GridGeometry {
    doctest::grid_geometry(NLAT, NLON).expect("oops")
}

pub fn windy_day(config: &PreprocessConfig) -> DayInput {
    doctest::windy_day(config, NLAT, NLON, NLEV)
}

pub fn windy_columns(config: &PreprocessConfig) -> Columns {
    let day = windy_day(config);
    build_columns(&day.profiles, &day.surface, config).expect("oops")
}
