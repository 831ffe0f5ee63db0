use crate::model::{AnalysisReport, Status};
use console::style;

pub fn print_reports(reports: &[AnalysisReport], json: bool) -> anyhow::Result<()> {
    if json {
        if let [single] = reports {
            println!("{}", serde_json::to_string_pretty(single)?);
        } else {
            println!("{}", serde_json::to_string_pretty(reports)?);
        }
        return Ok(());
    }
    for report in reports {
        output_table(report);
    }
    Ok(())
}

fn styled_status(status: Status) -> console::StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        Status::Done => style(text).green(),
        Status::Failed => style(text).red(),
        Status::InProgress => style(text).yellow(),
        Status::Todo => style(text).dim(),
    }
}

fn output_table(report: &AnalysisReport) {
    println!("{}", style(&report.repo_url).bold());
    println!(
        "status: {}  loc facts: {}  commit frequency facts: {}",
        styled_status(report.status),
        styled_status(report.loc_facts_status),
        styled_status(report.commit_freq_facts_status)
    );

    if report.loc_analysis.is_empty() {
        println!("No line ownership data yet\n");
        return;
    }

    println!(
        "{:<40} {:>10} {:>11} {:>11} {:>12}",
        style("Committer").bold(),
        style("LOC").bold(),
        style("Percentile").bold(),
        style("Percentage").bold(),
        style("Consistency").bold()
    );
    println!("{}", "─".repeat(88));

    let mut rows: Vec<_> = report.loc_analysis.values().collect();
    rows.sort_by(|a, b| b.loc.cmp(&a.loc).then_with(|| a.email.cmp(&b.email)));
    for row in rows {
        let consistency = report
            .commit_freq_analysis
            .get(&row.email)
            .map(|score| format!("{score:.4}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:>10} {:>11.2} {:>11.2} {:>12}",
            row.email, row.loc, row.loc_percentile, row.loc_percentage, consistency
        );
    }
    println!();
}
