/*!
# Org Chart

A browser-based organizational chart for a company, built in Rust.

## Overview

HR administrators upload two spreadsheets: the organogram (one row per
employee, with the id of the employee's manager) and the salary grade table
(one row per grade, with the band floor and ceiling). The server validates
both, keeps the latest pair, and serves an interactive chart that can be
filtered by directorate. Clicking an employee opens a detail card with the
employee's grade, salary and position inside the salary band.

## Architecture

### Core (always compiled)
- **record**: Spreadsheet cell values, records and identifier normalization
- **config**: Column mapping and environment configuration
- **loader**: XLSX/XLS/ODS/CSV reading into records
- **validator**: Organogram and grade sheet validation with per-line messages
- **calculations**: Position of a salary inside its band (80 / 100 / 120 scale)
- **merge**: Join of employees with their grade and band percentage
- **tree**: Hierarchy index, subtree extraction and directorate filter
- **card**: Employee detail card formatting
- **downloader**: CSV and XLSX export of a chart view

### Web layer (`web` feature)
- **storage**: Versioned dataset store with bundled defaults
- **login**: Admin password check, sessions and the auth guard
- **app**: Routing, upload pipeline and chart snapshot cache

## REST API Endpoints

- `POST /api/login`, `GET /api/logout` - Admin session
- `POST /api/upload` - Replace both datasets (multipart)
- `GET /api/data-urls` - Location of the current datasets
- `GET /data/{kind}` - Raw dataset download
- `GET /api/chart` - Chart nodes, optionally filtered by directorate
- `GET /api/employees/{id}` - Detail card of one employee
- `GET /api/export` - CSV/XLSX download of the current view
- `GET /health` - Liveness check
*/

pub mod calculations;
pub mod card;
pub mod config;
pub mod downloader;
pub mod loader;
pub mod merge;
pub mod record;
pub mod tree;
pub mod validator;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod storage;

pub use calculations::band_percentage;
pub use config::{AppConfig, ColumnMapping};
pub use merge::merge_grades;
pub use record::{CellValue, NodeId, Record, Sheet};
pub use tree::{OrgTree, get_subtree};
pub use validator::{ValidationResult, validate_grades, validate_organogram};
