//! Core library for the json-excel command line application.
//!
//! Converts nested JSON records, MongoDB extended-JSON exports included, into
//! multi-sheet Excel workbooks. The modules keep responsibilities narrow:
//! [`coerce`] normalises extended scalars, [`flatten`] turns trees into flat
//! records, [`expand`] produces one row per nested array element,
//! [`aggregate`] computes grouped statistics, [`workbook`] assembles the
//! sheets, and [`io`] reads JSON and writes `.xlsx` files. [`convert`] ties
//! them together for the CLI.

pub mod aggregate;
pub mod coerce;
pub mod config;
pub mod convert;
pub mod error;
pub mod expand;
pub mod flatten;
pub mod io;
pub mod model;
pub mod workbook;

pub use config::Config;
pub use error::{Result, ToolError};
