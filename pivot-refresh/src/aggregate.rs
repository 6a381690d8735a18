//! FILENAME: pivot-refresh/src/aggregate.rs
//! Aggregation Engine - computes every aggregate a layout can ask for.
//!
//! One pass over the live records feeds an accumulator for every
//! (row-prefix, column-prefix) combination, so leaf cells, subtotals at
//! every depth, and grand totals all come out of the same map. A missing
//! key means no record matched that intersection; the layout renders it
//! blank.
//!
//! Numeric moments use Welford's online algorithm, which is numerically
//! stable and gives sum, mean, and both sample and population variance
//! from a single pass.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::cache::{CacheRecord, CacheValue, FieldKind, SourceCache, ValueId};
use crate::context::{AxisField, RefreshContext};
use crate::definition::{DataField, FieldIndex, Function};

// ============================================================================
// FORMULA EVALUATION SEAM
// ============================================================================

/// A single record exposed to the formula evaluator: source values by
/// field name or index, plus calculated fields already evaluated for this
/// record. References that resolve to nothing read as `None`; evaluators
/// conventionally treat those as zero.
pub struct RecordView<'a> {
    cache: &'a SourceCache,
    record: &'a CacheRecord,
    calculated: &'a FxHashMap<FieldIndex, f64>,
}

impl RecordView<'_> {
    /// The record's numeric value at a cache field index. Calculated
    /// fields resolve to their already-evaluated value; forward or cyclic
    /// references are still unevaluated and read as `None`.
    pub fn number_at(&self, index: FieldIndex) -> Option<f64> {
        if let Some(&v) = self.calculated.get(&index) {
            return Some(v);
        }
        let field = self.cache.field(index)?;
        if matches!(field.kind, FieldKind::Calculated { .. }) {
            return None;
        }
        let id = self.record.values.get(index).copied()?;
        field.get_value(id).and_then(CacheValue::as_number)
    }

    /// Numeric value by field name.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.number_at(self.cache.field_index_by_name(name)?)
    }

    /// Text value by field name, for evaluators that support string
    /// operands.
    pub fn text(&self, name: &str) -> Option<String> {
        let index = self.cache.field_index_by_name(name)?;
        let field = self.cache.field(index)?;
        let id = self.record.values.get(index).copied()?;
        match field.get_value(id)? {
            CacheValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// The original 0-based source row of this record.
    pub fn source_row(&self) -> u32 {
        self.record.source_row
    }
}

/// Evaluates calculated-field formulas against single records. The pivot
/// engine does not parse formulas itself; the host spreadsheet plugs its
/// evaluator in here.
pub trait FormulaEvaluator {
    /// Evaluates `formula` for one record. Unresolvable formulas should
    /// yield `0.0`; the engine never treats evaluation as an error.
    fn evaluate(&self, formula: &str, record: &RecordView<'_>) -> f64;
}

impl<F> FormulaEvaluator for F
where
    F: Fn(&str, &RecordView<'_>) -> f64,
{
    fn evaluate(&self, formula: &str, record: &RecordView<'_>) -> f64 {
        self(formula, record)
    }
}

/// Evaluator used when the host provides none: every formula yields zero.
pub fn null_evaluator() -> impl FormulaEvaluator {
    |_formula: &str, _record: &RecordView<'_>| 0.0
}

// ============================================================================
// DATA VALUE RESOLUTION
// ============================================================================

/// A record's contribution to one data field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DataValue {
    /// Blank cell: contributes to nothing.
    Missing,
    /// Text, boolean, or error: counts for Count, ignored by the numeric
    /// functions.
    NonNumeric,
    Number(f64),
}

/// Resolves every live record's value for every data field. Calculated
/// fields are evaluated per record in cache declaration order, so a
/// formula may reference calculated fields declared before it; forward or
/// cyclic references read as unresolved.
pub(crate) fn resolve_data_values(
    ctx: &RefreshContext<'_>,
    data_fields: &[DataField],
    evaluator: &dyn FormulaEvaluator,
) -> Vec<Vec<DataValue>> {
    let cache = ctx.cache;
    let calc_fields: Vec<(FieldIndex, String)> = cache
        .fields
        .iter()
        .enumerate()
        .filter_map(|(i, f)| match &f.kind {
            FieldKind::Calculated { formula } => Some((i, formula.clone())),
            _ => None,
        })
        .collect();

    let mut resolved = vec![vec![DataValue::Missing; data_fields.len()]; cache.record_count()];

    for record_idx in ctx.live_records() {
        let record = &cache.records[record_idx];

        let mut computed: FxHashMap<FieldIndex, f64> = FxHashMap::default();
        for (index, formula) in &calc_fields {
            let value = {
                let view = RecordView {
                    cache,
                    record,
                    calculated: &computed,
                };
                evaluator.evaluate(formula, &view)
            };
            computed.insert(*index, value);
        }

        for (df_idx, df) in data_fields.iter().enumerate() {
            resolved[record_idx][df_idx] = if let Some(&v) = computed.get(&df.source_index) {
                DataValue::Number(v)
            } else {
                match record
                    .values
                    .get(df.source_index)
                    .and_then(|&id| cache.field(df.source_index).and_then(|f| f.get_value(id)))
                {
                    Some(CacheValue::Empty) | None => DataValue::Missing,
                    Some(CacheValue::Number(n)) => DataValue::Number(n.as_f64()),
                    Some(_) => DataValue::NonNumeric,
                }
            };
        }
    }

    resolved
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// Single-pass accumulator covering all eleven aggregation functions.
#[derive(Debug, Clone, Default)]
pub(crate) struct AggregateAccumulator {
    /// Non-blank values (numeric or not). This is what Count reports.
    count_all: u64,
    /// Numeric values only.
    count_nums: u64,
    sum: f64,
    min: f64,
    max: f64,
    product: f64,
    mean: f64,
    m2: f64,
}

impl AggregateAccumulator {
    pub fn add_number(&mut self, v: f64) {
        self.count_all += 1;
        if self.count_nums == 0 {
            self.min = v;
            self.max = v;
            self.product = 1.0;
        } else {
            if v < self.min {
                self.min = v;
            }
            if v > self.max {
                self.max = v;
            }
        }
        self.count_nums += 1;
        self.sum += v;
        self.product *= v;

        // Welford update.
        let delta = v - self.mean;
        self.mean += delta / self.count_nums as f64;
        self.m2 += delta * (v - self.mean);
    }

    /// A non-blank, non-numeric value: visible to Count only.
    pub fn add_non_number(&mut self) {
        self.count_all += 1;
    }

    /// The aggregated value for one function. Groups that matched records
    /// but hold no numbers report zero for the numeric functions; the
    /// small-sample variance cases also report zero.
    pub fn value(&self, function: Function) -> f64 {
        let n = self.count_nums as f64;
        match function {
            Function::Sum => self.sum,
            Function::Count => self.count_all as f64,
            Function::CountNums => self.count_nums as f64,
            Function::Average => {
                if self.count_nums > 0 {
                    self.sum / n
                } else {
                    0.0
                }
            }
            Function::Max => {
                if self.count_nums > 0 {
                    self.max
                } else {
                    0.0
                }
            }
            Function::Min => {
                if self.count_nums > 0 {
                    self.min
                } else {
                    0.0
                }
            }
            Function::Product => {
                if self.count_nums > 0 {
                    self.product
                } else {
                    0.0
                }
            }
            Function::StdDev => {
                if self.count_nums >= 2 {
                    (self.m2 / (n - 1.0)).sqrt()
                } else {
                    0.0
                }
            }
            Function::StdDevp => {
                if self.count_nums >= 1 {
                    (self.m2 / n).sqrt()
                } else {
                    0.0
                }
            }
            Function::Var => {
                if self.count_nums >= 2 {
                    self.m2 / (n - 1.0)
                } else {
                    0.0
                }
            }
            Function::Varp => {
                if self.count_nums >= 1 {
                    self.m2 / n
                } else {
                    0.0
                }
            }
        }
    }
}

// ============================================================================
// GROUP KEYS
// ============================================================================

/// Identifies one aggregation cell: a row-path prefix crossed with a
/// column-path prefix. Prefix lengths are part of the key, so a blank item
/// at level 0 never collides with the level-0 rollup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GroupKey {
    row_len: u8,
    col_len: u8,
    ids: SmallVec<[ValueId; 8]>,
}

impl GroupKey {
    pub fn new(row_prefix: &[ValueId], col_prefix: &[ValueId]) -> Self {
        let mut ids = SmallVec::with_capacity(row_prefix.len() + col_prefix.len());
        ids.extend_from_slice(row_prefix);
        ids.extend_from_slice(col_prefix);
        GroupKey {
            row_len: row_prefix.len() as u8,
            col_len: col_prefix.len() as u8,
            ids,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// All aggregates of one refresh, keyed by (row-prefix, column-prefix).
pub(crate) struct AggregationEngine {
    cells: FxHashMap<GroupKey, Vec<AggregateAccumulator>>,
    data_count: usize,
}

impl AggregationEngine {
    /// Builds the full aggregate map in one pass over the live records.
    /// Every record feeds the accumulators of every prefix combination of
    /// its row and column paths, including the empty prefixes (subtotals
    /// and grand totals).
    pub fn build(
        ctx: &RefreshContext<'_>,
        row_axis: &[AxisField],
        column_axis: &[AxisField],
        data_values: &[Vec<DataValue>],
    ) -> Self {
        let data_count = data_values.first().map(|v| v.len()).unwrap_or(0);
        let mut cells: FxHashMap<GroupKey, Vec<AggregateAccumulator>> = FxHashMap::default();

        let mut row_path: SmallVec<[ValueId; 8]> = SmallVec::new();
        let mut col_path: SmallVec<[ValueId; 8]> = SmallVec::new();

        for record_idx in ctx.live_records() {
            row_path.clear();
            col_path.clear();
            for f in row_axis {
                row_path.push(ctx.value_at(record_idx, f.field_index));
            }
            for f in column_axis {
                col_path.push(ctx.value_at(record_idx, f.field_index));
            }

            let values = &data_values[record_idx];
            for r in 0..=row_path.len() {
                for c in 0..=col_path.len() {
                    let key = GroupKey::new(&row_path[..r], &col_path[..c]);
                    let accs = cells
                        .entry(key)
                        .or_insert_with(|| vec![AggregateAccumulator::default(); data_count]);
                    for (df_idx, value) in values.iter().enumerate() {
                        match value {
                            DataValue::Number(v) => accs[df_idx].add_number(*v),
                            DataValue::NonNumeric => accs[df_idx].add_non_number(),
                            DataValue::Missing => {}
                        }
                    }
                }
            }
        }

        AggregationEngine { cells, data_count }
    }

    pub fn data_count(&self) -> usize {
        self.data_count
    }

    /// The aggregate at an intersection, or `None` when no record matched
    /// it (rendered as a blank cell).
    pub fn value(
        &self,
        row_prefix: &[ValueId],
        col_prefix: &[ValueId],
        data_field: usize,
        function: Function,
    ) -> Option<f64> {
        self.cells
            .get(&GroupKey::new(row_prefix, col_prefix))
            .and_then(|accs| accs.get(data_field))
            .map(|acc| acc.value(function))
    }

    /// True when at least one record matched the intersection.
    pub fn occupied(&self, row_prefix: &[ValueId], col_prefix: &[ValueId]) -> bool {
        self.cells
            .contains_key(&GroupKey::new(row_prefix, col_prefix))
    }
}
