pub mod status_report;
