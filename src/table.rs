use crate::state::Command;
use crate::types::{MetricField, TabularRow};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub district: String,
    pub temperature: String,
    pub population: String,
    pub births: String,
    pub deaths: String,
}

/// Row list mirroring the whole store. Map filters never apply here.
#[derive(Debug, Default, Serialize)]
pub struct TableView {
    pub rows: Vec<TableRow>,
    pub visible: bool,
}

impl TableView {
    pub fn rebuild(&mut self, rows: &[TabularRow]) {
        self.rows.clear();
        self.rows.extend(rows.iter().map(|row| TableRow {
            district: row.district.to_string(),
            temperature: row.metric(MetricField::Temperature).to_string(),
            population: row.metric(MetricField::Population).to_string(),
            births: row.metric(MetricField::Births).to_string(),
            deaths: row.metric(MetricField::Deaths).to_string(),
        }));
    }

    /// Command issued by clicking the row at `index`.
    pub fn click(&self, index: usize) -> Option<Command> {
        let row = self.rows.get(index)?;
        row.district.parse().ok().map(Command::SelectDistrict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_csv;

    #[test]
    fn rebuild_replaces_previous_rows() {
        let mut table = TableView::default();
        table.rebuild(&parse_csv("District,Temperature\nAdilabad,31\nNirmal,29\n", "District").unwrap());
        table.rebuild(&parse_csv("District,Temperature,Population,Births,Deaths\nWarangal,30,1,2,3\n", "District").unwrap());

        assert_eq!(table.rows.len(), 1);
        assert_eq!(
            table.rows[0],
            TableRow {
                district: "Warangal".into(),
                temperature: "30".into(),
                population: "1".into(),
                births: "2".into(),
                deaths: "3".into(),
            }
        );
    }

    #[test]
    fn click_selects_row_district() {
        let mut table = TableView::default();
        table.rebuild(&parse_csv("District,Temperature\nAdilabad,31\n", "District").unwrap());

        match table.click(0) {
            Some(Command::SelectDistrict(name)) => assert_eq!(name.as_str(), "Adilabad"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(table.click(3).is_none());
    }
}
