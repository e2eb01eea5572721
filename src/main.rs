// Entry point and high-level CLI flow.
//
// - Option [1] loads and cleans the fleet source, printing diagnostics.
// - Option [2] generates the report tables, the KPI cards and a JSON summary.
// - Option [3] drops the cached table so the next load re-reads the source.
// - Option [4] picks the year/month/region/branch filters.
// After generating reports, the user can go back to the menu or exit.
use clap::Parser;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tabled::Tabled;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use fleet_report::config::Args;
use fleet_report::filters::{self, FilterParams, Selection};
use fleet_report::kpi::{self, CostMetric, PerformanceKpis, Variability};
use fleet_report::output;
use fleet_report::provider::DataProvider;
use fleet_report::reports;
use fleet_report::types::{BranchInsights, OperationalKpis, SummaryStats};
use fleet_report::util::{format_int, format_money, format_number};

// The provider owns the cached table; filters are rebuilt from the menu and
// handed to each report run.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| {
    Mutex::new(AppState {
        provider: None,
        filters: FilterParams::default(),
    })
});

struct AppState {
    provider: Option<Arc<DataProvider>>,
    filters: FilterParams,
}

fn state() -> MutexGuard<'static, AppState> {
    APP_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    filters: &'a FilterParams,
    summary: SummaryStats,
    operational: OperationalKpis,
    branch_insights: BranchInsights,
    performance: Option<PerformanceKpis>,
    variability: Option<Variability>,
}

/// Read a single line of input after printing `prompt`.
fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    if let Ok(0) = io::stdin().read_line(&mut buf) {
        // stdin closed
        println!();
        std::process::exit(0);
    }
    buf.trim().to_string()
}

fn read_choice() -> String {
    read_line("Enter choice: ")
}

/// Ask the user whether to go back to the report selection menu after
/// generating reports.
fn prompt_back_to_menu() -> bool {
    loop {
        match read_line("Back to Report Selection (Y/N): ").to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Offer `options` as a numbered list; `0` or an empty answer keeps "All".
fn pick<T: Clone + std::fmt::Display>(label: &str, options: &[T]) -> Selection<T> {
    if options.is_empty() {
        return Selection::All;
    }
    println!("{}:", label);
    println!("  [0] All");
    for (i, o) in options.iter().enumerate() {
        println!("  [{}] {}", i + 1, o);
    }
    loop {
        let answer = read_choice();
        if answer.is_empty() || answer == "0" {
            return Selection::All;
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => {
                return Selection::Only(options[n - 1].clone())
            }
            _ => println!("Invalid choice. Please enter 0-{}.", options.len()),
        }
    }
}

fn provider() -> Option<Arc<DataProvider>> {
    state().provider.clone()
}

/// Handle option [1]: load (or reuse) the cleaned table and print diagnostics.
fn handle_load() {
    let Some(provider) = provider() else {
        return;
    };
    println!("Loading {}...", provider.source().describe());
    let data = provider.get_data();
    if data.is_empty() {
        println!("No data available. Check the source and try again.\n");
        return;
    }
    if let Some(report) = provider.last_report() {
        println!(
            "Processing dataset... ({} rows read, {} kept)",
            format_int(report.total_rows),
            format_int(report.kept_rows)
        );
        if report.missing_dates > 0 {
            println!(
                "Note: {} rows skipped due to missing or invalid month.",
                format_int(report.missing_dates)
            );
        }
        if report.outside_restricted_year > 0 {
            println!(
                "Note: {} rows outside the selected year.",
                format_int(report.outside_restricted_year)
            );
        }
        if report.unmatched_fleet > 0 || report.unmatched_branches > 0 {
            println!(
                "Info: {} plates without fleet record, {} rows without branch.",
                format_int(report.unmatched_fleet),
                format_int(report.unmatched_branches)
            );
        }
        if report.adjusted_efficiency > 0 {
            println!(
                "Info: Adjusted fuel efficiency for {} rows ({} from the fleet-wide mean).",
                format_int(report.adjusted_efficiency),
                format_int(report.global_fallbacks)
            );
        }
    }
    println!();
}

/// Handle option [4]: choose filters from the values present in the data.
fn handle_filters() {
    let Some(provider) = provider() else {
        return;
    };
    let data = provider.get_data();
    if data.is_empty() {
        println!("Error: No data loaded. Please load the data first (option 1).\n");
        return;
    }
    let year = pick("Year", &filters::available_years(&data));
    let month = pick("Month", &filters::available_months(&data, &year));
    let region = pick("Region", &filters::available_regions(&data));
    let branch = pick("Branch", &filters::available_branches(&data, &region));
    let fuel_type = pick("Fuel type", &filters::available_fuel_types(&data));
    let params = FilterParams {
        year,
        month,
        region,
        branch,
        fuel_type,
    };
    println!(
        "Filters set: {}\n",
        params.describe().unwrap_or_else(|| "none".to_string())
    );
    state().filters = params;
}

fn export<T>(args: &Args, report_no: usize, title: &str, note: Option<&str>, file: &str, rows: &[T])
where
    T: Serialize + Tabled + Clone,
{
    let written = output::output_path(&args.output_dir, file)
        .and_then(|path| output::write_csv(&path, rows).map(|_| path));
    output::preview_table(report_no, title, note, rows, args.preview_rows);
    match written {
        Ok(path) => println!("(Full table exported to {})\n", path.display()),
        Err(e) => {
            error!(file, error = %e, "Export failed");
            eprintln!("Write error: {}", e);
        }
    }
}

fn print_performance(k: &PerformanceKpis) {
    println!("Performance ({}) - {}", k.metric, k.month);
    println!(
        "  Current month: {} ({}% vs previous month, {}% vs 3-month average)",
        format_money(k.current),
        format_number(k.pct_vs_previous, 1),
        format_number(k.pct_vs_avg_3m, 1)
    );
    println!(
        "  Cost per working day: {} ({} working days)",
        format_money(k.cost_per_working_day),
        format_number(k.working_days_current, 0)
    );
    println!(
        "  Vehicles: {}  Cost per vehicle: {}  Trend: {}\n",
        format_int(k.vehicles),
        format_money(k.cost_per_vehicle),
        k.trend
    );
}

/// Handle option [2]: generate all reports and the JSON summary.
///
/// Side effects: writes one CSV per report plus `summary.json` into the
/// output directory and prints Markdown previews to the console.
fn handle_generate_reports(args: &Args, metric: CostMetric) {
    let Some(provider) = provider() else {
        return;
    };
    let all = provider.get_data();
    if all.is_empty() {
        println!("Error: No data loaded. Please load the data first (option 1).\n");
        return;
    }
    let params = state().filters.clone();
    let filtered = params.apply(&all);
    if filtered.is_empty() {
        println!("No records match the selected filters.\n");
        return;
    }
    let note = params.describe();
    let note = note.as_deref();
    info!(rows = filtered.len(), filters = ?note, "Generating reports");

    println!("Generating reports...");
    println!("Outputs saved to {}\n", args.output_dir.display());

    let r1 = reports::annual_summary(&all, &params.year, None);
    export(
        args,
        1,
        "Annual Fleet Cost Summary",
        Some("Latest year projected"),
        "report1_annual_summary.csv",
        &r1,
    );

    let (r2, r2_note) = if params.month.is_all() {
        (reports::annual_category_comparison(&all), "Year over year")
    } else {
        (reports::category_comparison(&filtered, &all), "Month over month")
    };
    export(
        args,
        2,
        "Cost Category Comparison",
        Some(r2_note),
        "report2_category_comparison.csv",
        &r2,
    );

    let r3 = reports::vehicle_group_costs(&filtered);
    export(args, 3, "Average Cost per Vehicle Group", note, "report3_vehicle_groups.csv", &r3);

    let r4 = reports::branch_panorama(&filtered);
    export(args, 4, "Branch Panorama", note, "report4_branch_panorama.csv", &r4);
    let insights = reports::branch_insights(&r4);
    if let Some(h) = &insights.most_efficient {
        println!(
            "Most efficient branch: {} ({}/km, potential savings {})",
            h.branch,
            format_money(h.value),
            format_money(h.detail)
        );
    }
    if let Some(h) = &insights.largest_operation {
        println!(
            "Largest operation: {} ({}, {}% of total cost)\n",
            h.branch,
            format_money(h.value),
            format_number(h.detail, 1)
        );
    }

    let r5 = reports::monthly_trends(&filtered);
    if r5.is_empty() {
        println!("Monthly trends need at least two months of data.\n");
    } else {
        export(args, 5, "Monthly Trends", note, "report5_monthly_trends.csv", &r5);
    }

    let r6 = reports::vehicle_detail(&filtered);
    export(args, 6, "Vehicle Detail", note, "report6_vehicle_detail.csv", &r6);

    let performance = kpi::performance_kpis(&all, &params.year, &params.month, metric);
    let variability = kpi::cost_variability(&all, &params.month, metric);
    match &performance {
        Some(k) => {
            print_performance(k);
            export(
                args,
                7,
                "Performance Windows",
                Some(k.metric.label()),
                "report7_performance_windows.csv",
                &k.windows(),
            );
        }
        None => println!("Select a year and month (option 4) to see the performance cards.\n"),
    }

    let summary = SummaryFile {
        filters: &params,
        summary: reports::generate_summary(&filtered),
        operational: reports::operational_kpis(&filtered),
        branch_insights: insights,
        performance,
        variability,
    };
    let written = output::output_path(&args.output_dir, "summary.json")
        .and_then(|path| output::write_json(&path, &summary));
    if let Err(e) = written {
        error!(error = %e, "Export failed");
        eprintln!("Write error: {}", e);
    }
    println!("Summary Stats (summary.json):");
    println!(
        "{{\"total_cost\": {}, \"vehicles\": {}, \"maintenance_pct\": {}}}\n",
        format_number(summary.summary.total_cost, 2),
        format_int(summary.summary.total_vehicles),
        format_number(summary.summary.split.maintenance_pct, 2)
    );
}

fn init_tracing() {
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );
    tracing_subscriber::registry().with(stderr_layer).init();
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let (metric, initial_filters) = match (args.metric(), args.filters()) {
        (Ok(m), Ok(f)) => (m, f),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    {
        let mut s = state();
        s.provider = Some(Arc::new(DataProvider::new(
            args.source(),
            args.pipeline_options(),
            args.cache_ttl(),
        )));
        s.filters = initial_filters;
    }

    if args.batch {
        handle_generate_reports(&args, metric);
        return;
    }

    loop {
        println!("Select Option:");
        println!("[1] Load data");
        println!("[2] Generate reports");
        println!("[3] Clear cache");
        println!("[4] Set filters\n");
        match read_choice().as_str() {
            "1" => handle_load(),
            "2" => {
                println!();
                handle_generate_reports(&args, metric);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "3" => {
                if let Some(p) = provider() {
                    p.clear();
                }
                println!("Cache cleared.\n");
            }
            "4" => handle_filters(),
            _ => println!("Invalid choice. Please enter 1, 2, 3 or 4.\n"),
        }
    }
}
