//! Terminal summaries of an update.

use crate::domain::UpdateSettings;
use crate::update::UpdateReport;

/// Multi-line summary printed by `ies update` and `ies smooth`.
pub fn format_update_summary(report: &UpdateReport, settings: &UpdateSettings) -> String {
    let rank = match report.rank {
        Some(k) => format!("{k} of {}", report.responses.min(report.realizations)),
        None => "n/a (dense ensemble-space inverse)".to_string(),
    };

    let mut out = String::new();
    out.push_str("Coefficient update\n");
    out.push_str(&format!(
        "  ensemble:     {} responses x {} realizations\n",
        report.responses, report.realizations
    ));
    out.push_str(&format!("  inversion:    {}\n", report.inversion));
    out.push_str(&format!("  truncation:   {}\n", settings.truncation));
    out.push_str(&format!("  step length:  {:.4}\n", settings.step_length));
    out.push_str(&format!("  rank kept:    {rank}\n"));
    out.push_str(&format!("  |ΔW|_F:       {:.6e}\n", report.change_norm));
    out.push_str(&format!("  |W|_F:        {:.6e}", report.coefficient_norm));
    out
}
