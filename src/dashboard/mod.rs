//! Dashboard metrics computed over the churn dataset

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::schema::numeric_columns;
use crate::data::{ChurnDataset, DatasetRow};

/// Multiselect filter; an empty list means every value passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardFilter {
    #[serde(default)]
    pub gender: Vec<String>,
    #[serde(default)]
    pub payment_method: Vec<String>,
    #[serde(default)]
    pub contract: Vec<String>,
}

impl DashboardFilter {
    /// Split a comma-separated query value into selections
    pub fn split_list(raw: Option<&str>) -> Vec<String> {
        raw.map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn matches(&self, row: &DatasetRow) -> bool {
        let pass = |selected: &[String], column: &str| {
            selected.is_empty()
                || row
                    .features
                    .category(column)
                    .map(|value| selected.iter().any(|s| s == value))
                    .unwrap_or(false)
        };
        pass(self.gender.as_slice(), "gender")
            && pass(self.payment_method.as_slice(), "PaymentMethod")
            && pass(self.contract.as_slice(), "Contract")
    }

    pub fn apply<'a>(&self, dataset: &'a ChurnDataset) -> Vec<&'a DatasetRow> {
        dataset.rows.iter().filter(|row| self.matches(row)).collect()
    }
}

/// Churn-rate gauge band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnBand {
    Low,
    Moderate,
    High,
    Critical,
}

impl ChurnBand {
    pub fn from_rate(rate: f64) -> Self {
        if rate < 25.0 {
            ChurnBand::Low
        } else if rate < 50.0 {
            ChurnBand::Moderate
        } else if rate < 75.0 {
            ChurnBand::High
        } else {
            ChurnBand::Critical
        }
    }
}

/// Headline numbers for the filtered customers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_customers: usize,
    pub churned_customers: usize,
    /// Percent of customers that churned; 0 when there are none
    pub churn_rate: f64,
    pub band: ChurnBand,
    pub avg_monthly_charges: Option<f64>,
    pub avg_total_charges: Option<f64>,
    pub avg_tenure: Option<f64>,
}

/// Per-tenure aggregates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenurePoint {
    pub tenure: i64,
    pub customers: usize,
    pub avg_monthly_charges: Option<f64>,
    pub churn_rate: f64,
}

/// Pearson correlations between the numeric columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<&'static str>,
    pub values: Vec<Vec<f64>>,
    /// Rows with all numeric columns present
    pub rows_used: usize,
}

/// Equal-width bins used for the distribution views
pub const HISTOGRAM_BINS: usize = 10;

/// Customers falling in `[lower, upper)`; the last bin also holds `upper`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub churned: usize,
    pub retained: usize,
}

/// Distribution of one numeric column split by churn outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChurnHistogram {
    pub column: &'static str,
    pub bins: Vec<HistogramBin>,
}

impl ChurnHistogram {
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.churned + b.retained).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub filter: DashboardFilter,
    pub kpis: Kpis,
    pub tenure_trends: Vec<TenurePoint>,
    pub tenure_distribution: ChurnHistogram,
    pub monthly_charges_distribution: ChurnHistogram,
    pub correlation: CorrelationMatrix,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

fn churn_rate(churned: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        churned as f64 / total as f64 * 100.0
    }
}

pub fn compute_kpis(rows: &[&DatasetRow]) -> Kpis {
    let churned = rows.iter().filter(|r| r.churned()).count();
    let rate = churn_rate(churned, rows.len());
    let column_mean = |column: &str| mean(rows.iter().filter_map(|r| r.features.number(column)));

    Kpis {
        total_customers: rows.len(),
        churned_customers: churned,
        churn_rate: rate,
        band: ChurnBand::from_rate(rate),
        avg_monthly_charges: column_mean("MonthlyCharges"),
        avg_total_charges: column_mean("TotalCharges"),
        avg_tenure: column_mean("tenure"),
    }
}

pub fn tenure_trends(rows: &[&DatasetRow]) -> Vec<TenurePoint> {
    let mut groups: BTreeMap<i64, Vec<&DatasetRow>> = BTreeMap::new();
    for row in rows {
        if let Some(tenure) = row.features.number("tenure") {
            groups.entry(tenure.round() as i64).or_default().push(*row);
        }
    }

    groups
        .into_iter()
        .map(|(tenure, group)| {
            let churned = group.iter().filter(|r| r.churned()).count();
            TenurePoint {
                tenure,
                customers: group.len(),
                avg_monthly_charges: mean(
                    group.iter().filter_map(|r| r.features.number("MonthlyCharges")),
                ),
                churn_rate: churn_rate(churned, group.len()),
            }
        })
        .collect()
}

/// Bin a numeric column over its observed range; missing values are skipped
pub fn churn_histogram(rows: &[&DatasetRow], column: &'static str, bins: usize) -> ChurnHistogram {
    let points: Vec<(f64, bool)> = rows
        .iter()
        .filter_map(|r| r.features.number(column).map(|v| (v, r.churned())))
        .collect();
    if points.is_empty() || bins == 0 {
        return ChurnHistogram {
            column,
            bins: Vec::new(),
        };
    }

    let (min, max) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (v, _)| {
            (lo.min(*v), hi.max(*v))
        });
    // A constant column collapses into one bin
    let count = if max > min { bins } else { 1 };
    let width = (max - min) / count as f64;

    let mut out: Vec<HistogramBin> = (0..count)
        .map(|i| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == count {
                max
            } else {
                min + width * (i + 1) as f64
            },
            churned: 0,
            retained: 0,
        })
        .collect();

    for (value, churned) in points {
        let idx = if width > 0.0 {
            (((value - min) / width) as usize).min(count - 1)
        } else {
            0
        };
        if churned {
            out[idx].churned += 1;
        } else {
            out[idx].retained += 1;
        }
    }

    ChurnHistogram { column, bins: out }
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        0.0
    } else {
        cov / (vx.sqrt() * vy.sqrt())
    }
}

pub fn correlation_matrix(rows: &[&DatasetRow]) -> CorrelationMatrix {
    let columns = numeric_columns();
    let complete: Vec<Vec<f64>> = rows
        .iter()
        .filter_map(|r| {
            columns
                .iter()
                .map(|c| r.features.number(c))
                .collect::<Option<Vec<f64>>>()
        })
        .collect();

    let series: Vec<Vec<f64>> = (0..columns.len())
        .map(|i| complete.iter().map(|row| row[i]).collect())
        .collect();

    let values = (0..columns.len())
        .map(|i| {
            (0..columns.len())
                .map(|j| if i == j { 1.0 } else { pearson(&series[i], &series[j]) })
                .collect()
        })
        .collect();

    CorrelationMatrix {
        columns,
        values,
        rows_used: complete.len(),
    }
}

/// Full dashboard for one filter selection
pub fn build_report(dataset: &ChurnDataset, filter: &DashboardFilter) -> DashboardReport {
    let rows = filter.apply(dataset);
    DashboardReport {
        filter: filter.clone(),
        kpis: compute_kpis(&rows),
        tenure_trends: tenure_trends(&rows),
        tenure_distribution: churn_histogram(&rows, "tenure", HISTOGRAM_BINS),
        monthly_charges_distribution: churn_histogram(&rows, "MonthlyCharges", HISTOGRAM_BINS),
        correlation: correlation_matrix(&rows),
    }
}
