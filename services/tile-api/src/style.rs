//! Query-parameter style resolution.
//!
//! Turns the user-facing style parameters (band selection, palette, value
//! range, nodata) into the canonical [`StyleDescriptor`] consumed by the
//! render engine. Resolution is pure validation: no raster is opened here,
//! so a bad palette name or band list fails before any I/O happens.

use renderer::is_valid_palette;
use tile_common::style::DEFAULT_N_COLORS;
use tile_common::{BandStyle, PaletteRef, Scheme, StyleDescriptor, TileError, TileResult};

/// Resolve request query parameters into a style descriptor.
///
/// A `style` parameter carrying the descriptor as URL-encoded JSON wins over
/// the individual parameters. With no style parameters at all the descriptor
/// is empty and band selection falls to raster introspection.
pub fn resolve(params: &[(String, String)]) -> TileResult<StyleDescriptor> {
    if let Some((_, blob)) = params.iter().find(|(key, _)| key == "style") {
        let style: StyleDescriptor =
            serde_json::from_str(blob).map_err(|_| TileError::MalformedStyle)?;
        validate(&style)?;
        return Ok(style);
    }

    let grouped = regroup(params);
    let band_raw = take(&grouped, &["band", "indexes"]);
    let palette_raw = take(&grouped, &["palette", "colormap", "cmap"]);
    let vmin_raw = take(&grouped, &["vmin", "min"]);
    let vmax_raw = take(&grouped, &["vmax", "max"]);
    let nodata_raw = take(&grouped, &["nodata"]);

    let scheme = parse_scheme(take(&grouped, &["scheme"]))?;
    let n_colors = parse_n_colors(take(&grouped, &["n_colors"]))?;

    let bands: Option<Vec<usize>> = match band_raw {
        Some((_, values)) => Some(
            values
                .iter()
                .map(|v| parse_band(v))
                .collect::<TileResult<_>>()?,
        ),
        None => None,
    };

    // Setting a range, palette, or nodata without naming a band implies
    // intent to view one band; default to the first.
    let any_band_param = palette_raw.is_some()
        || vmin_raw.is_some()
        || vmax_raw.is_some()
        || nodata_raw.is_some();
    let bands = match bands {
        Some(list) => list,
        None if any_band_param => vec![1],
        None => {
            return Ok(StyleDescriptor {
                bands: Vec::new(),
                scheme,
                n_colors,
            })
        }
    };
    let n = bands.len();

    // Three bands with no palette view as an RGB composite.
    let palettes: Option<Vec<PaletteRef>> = match palette_raw {
        Some((_, values)) => Some(
            values
                .iter()
                .map(|v| PaletteRef::Named(v.clone()))
                .collect(),
        ),
        None if n == 3 => Some(
            ["r", "g", "b"]
                .iter()
                .map(|hue| PaletteRef::Named(hue.to_string()))
                .collect(),
        ),
        None => None,
    };
    let palette_name = palette_raw.map(|(name, _)| name).unwrap_or("palette");

    let vmin = spread_floats(vmin_raw, n)?;
    let vmax = spread_floats(vmax_raw, n)?;
    let nodata = spread_floats(nodata_raw, n)?;
    let palettes = spread(palette_name, palettes, n)?;

    let bands = bands
        .into_iter()
        .enumerate()
        .map(|(i, band)| BandStyle {
            band,
            min: vmin[i],
            max: vmax[i],
            palette: palettes[i].clone(),
            nodata: nodata[i],
        })
        .collect();

    let style = StyleDescriptor {
        bands,
        scheme,
        n_colors,
    };
    validate(&style)?;
    Ok(style)
}

/// Reject descriptors the render engine would fail on: zero band indexes,
/// unknown palette names, empty color lists, zero palette size.
fn validate(style: &StyleDescriptor) -> TileResult<()> {
    for band in &style.bands {
        if band.band == 0 {
            return Err(band_zero_error());
        }
        if let Some(palette) = &band.palette {
            if !is_valid_palette(palette) {
                return Err(TileError::UnknownPalette(palette_label(palette)));
            }
        }
    }
    if style.n_colors == 0 {
        return Err(TileError::invalid_param(
            "n_colors",
            "n_colors must be a positive integer",
        ));
    }
    Ok(())
}

/// Group query pairs by base parameter name, preserving encounter order.
///
/// A dotted suffix (`band.1=3&band.2=2`) and a repeated key
/// (`band=3&band=2`) both form the list `["3", "2"]`; a single occurrence
/// stays a one-element group and is treated as a scalar.
fn regroup(params: &[(String, String)]) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in params {
        let base = key.split('.').next().unwrap_or(key);
        match grouped.iter_mut().find(|(name, _)| name == base) {
            Some((_, values)) => values.push(value.clone()),
            None => grouped.push((base.to_string(), vec![value.clone()])),
        }
    }
    grouped
}

/// First matching parameter group among `names`, with the name that matched.
fn take<'a>(
    grouped: &'a [(String, Vec<String>)],
    names: &[&'static str],
) -> Option<(&'static str, &'a [String])> {
    for name in names {
        if let Some((_, values)) = grouped.iter().find(|(key, _)| key == name) {
            return Some((*name, values.as_slice()));
        }
    }
    None
}

fn parse_band(value: &str) -> TileResult<usize> {
    let band: usize = value.trim().parse().map_err(|_| {
        TileError::invalid_param(
            "band",
            format!("expected an integer band index, got '{}'", value),
        )
    })?;
    if band == 0 {
        return Err(band_zero_error());
    }
    Ok(band)
}

fn band_zero_error() -> TileError {
    TileError::invalid_param("band", "0 is an invalid band index. Bands start at 1.")
}

fn parse_scheme(group: Option<(&str, &[String])>) -> TileResult<Scheme> {
    let value = match group.and_then(|(_, values)| values.first()) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(Scheme::Linear),
    };
    match value.to_lowercase().as_str() {
        "linear" => Ok(Scheme::Linear),
        "discrete" => Ok(Scheme::Discrete),
        _ => Err(TileError::invalid_param(
            "scheme",
            format!("expected 'linear' or 'discrete', got '{}'", value),
        )),
    }
}

fn parse_n_colors(group: Option<(&str, &[String])>) -> TileResult<u16> {
    let value = match group.and_then(|(_, values)| values.first()) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(DEFAULT_N_COLORS),
    };
    let n: u16 = value.parse().map_err(|_| {
        TileError::invalid_param(
            "n_colors",
            format!("expected a positive integer, got '{}'", value),
        )
    })?;
    if n == 0 {
        return Err(TileError::invalid_param(
            "n_colors",
            "n_colors must be a positive integer",
        ));
    }
    Ok(n)
}

/// Parse and align a numeric parameter with the selected bands.
fn spread_floats(
    group: Option<(&str, &[String])>,
    n: usize,
) -> TileResult<Vec<Option<f64>>> {
    let (name, values) = match group {
        Some(group) => group,
        None => return Ok(vec![None; n]),
    };
    let parsed: Vec<f64> = values
        .iter()
        .map(|v| {
            v.trim().parse().map_err(|_| {
                TileError::invalid_param(name, format!("expected a number, got '{}'", v))
            })
        })
        .collect::<TileResult<_>>()?;
    spread(name, Some(parsed), n)
}

/// Align a scalar-or-list parameter with the selected bands.
///
/// Scalars broadcast to every band; lists must match the band count.
fn spread<T: Clone>(name: &str, values: Option<Vec<T>>, n: usize) -> TileResult<Vec<Option<T>>> {
    match values {
        None => Ok(vec![None; n]),
        Some(list) if list.len() == 1 => Ok(vec![Some(list[0].clone()); n]),
        Some(list) if list.len() == n => Ok(list.into_iter().map(Some).collect()),
        Some(list) => Err(TileError::invalid_param(
            name,
            format!("{} values for {} selected bands", list.len(), n),
        )),
    }
}

fn palette_label(palette: &PaletteRef) -> String {
    match palette {
        PaletteRef::Named(name) => name.clone(),
        PaletteRef::Colors(colors) => format!("[{}]", colors.join(", ")),
    }
}
