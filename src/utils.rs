use anyhow::{anyhow, Result};
use std::str::FromStr;

pub fn parse_number<T: FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| anyhow!("Invalid value for {}: '{}'", name, value))
}

/// Parses dimensions given as `WIDTHxHEIGHT`, e.g. `1048x1048`.
pub fn parse_dimensions(value: &str) -> Result<(u32, u32)> {
    let parts = value
        .split(|c| c == 'x' || c == 'X')
        .collect::<Vec<&str>>();
    if parts.len() != 2 {
        return Err(anyhow!(
            "Dimensions must be in WIDTHxHEIGHT format, got '{}'",
            value
        ));
    }
    let width: u32 = parse_number(parts[0], "width")?;
    let height: u32 = parse_number(parts[1], "height")?;
    if width == 0 || height == 0 {
        return Err(anyhow!("Dimensions must be non-zero, got '{}'", value));
    }
    Ok((width, height))
}
