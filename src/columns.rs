// 📐 Coordinate Alignment - column bands from header labels
//
// A header label's left edge (x0) or right edge (x1) becomes the reference
// edge of its column. Any later fragment whose matching edge lies within
// the tolerance of that reference belongs to the column.

use crate::layout::Fragment;
use thiserror::Error;

// ============================================================================
// COLUMN SPECS (per-format vocabulary)
// ============================================================================

/// Which edge of a fragment lines up with the column header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Left-aligned text: compare x0.
    Left,
    /// Right-aligned numbers: compare x1.
    Right,
    /// Right-aligned, but values may overhang the header (e.g. "12.00 CR").
    RightOrBeyond,
}

/// How the column's literal is typed once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Amount,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub anchor: Anchor,
    pub kind: ColumnKind,
    pub mandatory: bool,
}

impl ColumnSpec {
    pub const fn left(name: &'static str, label: &'static str, kind: ColumnKind) -> Self {
        ColumnSpec {
            name,
            label,
            anchor: Anchor::Left,
            kind,
            mandatory: true,
        }
    }

    pub const fn right(name: &'static str, label: &'static str, kind: ColumnKind) -> Self {
        ColumnSpec {
            name,
            label,
            anchor: Anchor::Right,
            kind,
            mandatory: true,
        }
    }

    pub const fn overhanging(mut self) -> Self {
        self.anchor = Anchor::RightOrBeyond;
        self
    }

    pub const fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }
}

/// Spec whose label is exactly `text`, if any.
pub fn label_spec<'s>(specs: &'s [ColumnSpec], text: &str) -> Option<&'s ColumnSpec> {
    let text = text.trim();
    specs.iter().find(|s| s.label == text)
}

// ============================================================================
// COLUMN BANDS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBand {
    pub name: &'static str,
    pub anchor: Anchor,
    pub kind: ColumnKind,
    pub edge: f64,
    pub tolerance: f64,
}

impl ColumnBand {
    fn from_label(spec: &ColumnSpec, label: &Fragment, tolerance: f64) -> Self {
        let edge = match spec.anchor {
            Anchor::Left => label.x0(),
            Anchor::Right | Anchor::RightOrBeyond => label.x1(),
        };
        ColumnBand {
            name: spec.name,
            anchor: spec.anchor,
            kind: spec.kind,
            edge,
            tolerance,
        }
    }

    pub fn matches(&self, fragment: &Fragment) -> bool {
        match self.anchor {
            Anchor::Left => (fragment.x0() - self.edge).abs() < self.tolerance,
            Anchor::Right => (fragment.x1() - self.edge).abs() < self.tolerance,
            Anchor::RightOrBeyond => fragment.x1() > self.edge - self.tolerance,
        }
    }

    fn overlaps(&self, other: &ColumnBand) -> bool {
        let same_side = matches!(
            (self.anchor, other.anchor),
            (Anchor::Left, Anchor::Left)
                | (
                    Anchor::Right | Anchor::RightOrBeyond,
                    Anchor::Right | Anchor::RightOrBeyond
                )
        );
        if !same_side {
            return false;
        }
        // An overhanging band claims everything to its right.
        match (self.anchor, other.anchor) {
            (Anchor::RightOrBeyond, _) => other.edge > self.edge - self.tolerance,
            (_, Anchor::RightOrBeyond) => self.edge > other.edge - other.tolerance,
            _ => (self.edge - other.edge).abs() < self.tolerance + other.tolerance,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("missing expected column '{0}'")]
    MissingColumn(&'static str),

    #[error("columns '{0}' and '{1}' overlap")]
    Overlap(&'static str, &'static str),
}

/// The resolved bands of one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnLayout {
    bands: Vec<ColumnBand>,
}

impl ColumnLayout {
    /// Build bands from header label fragments.
    ///
    /// The first fragment carrying a label wins. Fails on the first
    /// mandatory label that is absent, or when two bands would overlap.
    pub fn resolve(
        header: &[&Fragment],
        specs: &[ColumnSpec],
        tolerance: f64,
    ) -> Result<ColumnLayout, LayoutError> {
        let mut bands = Vec::with_capacity(specs.len());
        for spec in specs {
            match header.iter().find(|f| f.text.trim() == spec.label) {
                Some(label) => bands.push(ColumnBand::from_label(spec, label, tolerance)),
                None if spec.mandatory => return Err(LayoutError::MissingColumn(spec.label)),
                None => {}
            }
        }

        let layout = ColumnLayout { bands };
        layout.check_disjoint()?;
        Ok(layout)
    }

    fn check_disjoint(&self) -> Result<(), LayoutError> {
        for (i, a) in self.bands.iter().enumerate() {
            for b in &self.bands[i + 1..] {
                if a.overlaps(b) {
                    return Err(LayoutError::Overlap(a.name, b.name));
                }
            }
        }
        Ok(())
    }

    /// Move a band to a newly seen header label (same table, later page).
    /// A label for a column not yet in the layout is added.
    pub fn reanchor(&mut self, spec: &ColumnSpec, label: &Fragment, tolerance: f64) {
        let band = ColumnBand::from_label(spec, label, tolerance);
        match self.bands.iter_mut().find(|b| b.name == spec.name) {
            Some(existing) => *existing = band,
            None => self.bands.push(band),
        }
    }

    /// The band a fragment belongs to.
    ///
    /// Disjointness only compares edges on the same side. A wide fragment
    /// can start at a left-anchored edge and end at a right-anchored one;
    /// the band declared first then takes it.
    pub fn classify(&self, fragment: &Fragment) -> Option<&ColumnBand> {
        self.bands.iter().find(|b| b.matches(fragment))
    }

    pub fn band(&self, name: &str) -> Option<&ColumnBand> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn bands(&self) -> &[ColumnBand] {
        &self.bands
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BBox;

    const SPECS: &[ColumnSpec] = &[
        ColumnSpec::left("date", "Date", ColumnKind::Date),
        ColumnSpec::left("description", "Description", ColumnKind::Text),
        ColumnSpec::right("withdrawals", "Withdrawals", ColumnKind::Amount),
        ColumnSpec::right("deposits", "Deposits", ColumnKind::Amount).optional(),
        ColumnSpec::right("balance", "Balance", ColumnKind::Amount),
    ];

    fn frag(text: &str, x0: f64, x1: f64) -> Fragment {
        Fragment::new(text, BBox::new(x0, 700.0, x1, 708.0))
    }

    fn header() -> Vec<Fragment> {
        vec![
            frag("Date", 40.0, 60.0),
            frag("Description", 100.0, 150.0),
            frag("Withdrawals", 300.0, 350.0),
            frag("Deposits", 390.0, 430.0),
            frag("Balance", 490.0, 525.0),
        ]
    }

    #[test]
    fn test_resolve_records_edges_by_anchor() {
        let header = header();
        let refs: Vec<&Fragment> = header.iter().collect();
        let layout = ColumnLayout::resolve(&refs, SPECS, 3.0).unwrap();

        assert_eq!(layout.band("date").unwrap().edge, 40.0);
        assert_eq!(layout.band("withdrawals").unwrap().edge, 350.0);
        assert_eq!(layout.band("balance").unwrap().edge, 525.0);
    }

    #[test]
    fn test_resolve_reports_missing_mandatory_column() {
        let header: Vec<Fragment> = header()
            .into_iter()
            .filter(|f| f.text != "Balance")
            .collect();
        let refs: Vec<&Fragment> = header.iter().collect();

        let err = ColumnLayout::resolve(&refs, SPECS, 3.0).unwrap_err();
        assert_eq!(err, LayoutError::MissingColumn("Balance"));
    }

    #[test]
    fn test_resolve_tolerates_missing_optional_column() {
        let header: Vec<Fragment> = header()
            .into_iter()
            .filter(|f| f.text != "Deposits")
            .collect();
        let refs: Vec<&Fragment> = header.iter().collect();

        let layout = ColumnLayout::resolve(&refs, SPECS, 3.0).unwrap();
        assert!(layout.band("deposits").is_none());
        assert_eq!(layout.bands().len(), 4);
    }

    #[test]
    fn test_classify_within_tolerance_only() {
        let header = header();
        let refs: Vec<&Fragment> = header.iter().collect();
        let layout = ColumnLayout::resolve(&refs, SPECS, 3.0).unwrap();

        // right edge 2.9 away from "Balance"
        let near = frag("1,000.00", 480.0, 522.1);
        assert_eq!(layout.classify(&near).unwrap().name, "balance");

        // right edge exactly at tolerance: not claimed
        let far = frag("1,000.00", 480.0, 522.0);
        assert!(layout.classify(&far).is_none());

        let date = frag("01 Mar", 41.5, 70.0);
        assert_eq!(layout.classify(&date).unwrap().name, "date");
    }

    #[test]
    fn test_classification_is_unique_across_bands() {
        let header = header();
        let refs: Vec<&Fragment> = header.iter().collect();
        let layout = ColumnLayout::resolve(&refs, SPECS, 3.0).unwrap();

        for x in (0..600).map(|x| x as f64) {
            let f = frag("x", x, x + 20.0);
            let claims = layout.bands().iter().filter(|b| b.matches(&f)).count();
            assert!(claims <= 1, "fragment at {} claimed by {} bands", x, claims);
        }
    }

    #[test]
    fn test_wide_fragment_goes_to_first_declared_band() {
        let header = header();
        let refs: Vec<&Fragment> = header.iter().collect();
        let layout = ColumnLayout::resolve(&refs, SPECS, 3.0).unwrap();

        // x0 on the Description edge, x1 on the Withdrawals edge
        let wide = frag("INTERBANK GIRO TRANSFER TO OCBC 0091", 100.0, 350.0);
        let claims: Vec<&str> = layout
            .bands()
            .iter()
            .filter(|b| b.matches(&wide))
            .map(|b| b.name)
            .collect();
        assert_eq!(claims, vec!["description", "withdrawals"]);
        assert_eq!(layout.classify(&wide).unwrap().name, "description");
    }

    #[test]
    fn test_overlapping_bands_are_rejected() {
        let header = vec![
            frag("Date", 40.0, 60.0),
            frag("Description", 42.0, 150.0),
            frag("Withdrawals", 300.0, 350.0),
            frag("Balance", 490.0, 525.0),
        ];
        let refs: Vec<&Fragment> = header.iter().collect();

        let err = ColumnLayout::resolve(&refs, SPECS, 3.0).unwrap_err();
        assert_eq!(err, LayoutError::Overlap("date", "description"));
    }

    #[test]
    fn test_overhanging_band_claims_credit_suffix() {
        let specs = &[
            ColumnSpec::left("description", "Description of Transaction", ColumnKind::Text),
            ColumnSpec::right("amount", "Transaction Amount", ColumnKind::Amount).overhanging(),
        ];
        let header = vec![
            frag("Description of Transaction", 120.0, 240.0),
            frag("Transaction Amount", 450.0, 520.0),
        ];
        let refs: Vec<&Fragment> = header.iter().collect();
        let layout = ColumnLayout::resolve(&refs, specs, 2.5).unwrap();

        let rebate = frag("120.50 CR", 480.0, 533.0);
        assert_eq!(layout.classify(&rebate).unwrap().name, "amount");
    }

    #[test]
    fn test_reanchor_moves_band() {
        let header = header();
        let refs: Vec<&Fragment> = header.iter().collect();
        let mut layout = ColumnLayout::resolve(&refs, SPECS, 3.0).unwrap();

        layout.reanchor(&SPECS[4], &frag("Balance", 500.0, 540.0), 3.0);
        assert_eq!(layout.band("balance").unwrap().edge, 540.0);
        assert_eq!(layout.bands().len(), 5);
    }
}
