use crate::config::AppConfig;
use crate::render::{MapRenderer, Popup, Styles, Tooltip};
use crate::store::TabularStore;
use crate::table::TableView;
use crate::types::{DistrictName, FeatureCollection, MetricField, TabularRow};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Filter value meaning "every district".
pub const ALL_SENTINEL: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "districts")]
pub enum Selection {
    All,
    Districts(Vec<DistrictName>),
}

impl Selection {
    /// Interprets the values picked in the multi-select. Any `all` wins.
    pub fn from_values<S: AsRef<str>>(values: &[S]) -> Self {
        if values.iter().any(|v| v.as_ref().trim().eq_ignore_ascii_case(ALL_SENTINEL)) {
            return Selection::All;
        }
        Selection::Districts(
            values
                .iter()
                .filter_map(|v| DistrictName::parse(v.as_ref()).ok())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Viewport {
    /// Fixed region overview, center as [lat, lon].
    Overview { center: [f64; 2], zoom: u8 },
    /// Fit to a lat/lon box given as [south, west] and [north, east].
    FitBounds {
        #[serde(rename = "southWest")]
        south_west: [f64; 2],
        #[serde(rename = "northEast")]
        north_east: [f64; 2],
        padding: [u32; 2],
    },
}

/// A discrete user or network event.
#[derive(Debug, Clone)]
pub enum Command {
    SetFilter(Selection),
    SetField(MetricField),
    Refresh,
    RefreshCompleted { sequence: u64, rows: Vec<TabularRow>, at: DateTime<Local> },
    RefreshFailed { sequence: u64, error: String },
    SelectDistrict(DistrictName),
    PointerEnter(DistrictName),
    PointerLeave(DistrictName),
    ShowTable,
    HideTable,
}

/// Work the caller has to carry out after a command was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch { sequence: u64 },
    Rendered,
    ViewportChanged(Viewport),
    ShowTooltip(Tooltip),
    OpenPopup(Popup),
    TableUpdated,
}

pub struct AppState {
    geometry: FeatureCollection,
    store: TabularStore,
    selection: Selection,
    field: MetricField,
    renderer: MapRenderer,
    table: TableView,
    viewport: Viewport,
    config: AppConfig,
}

impl AppState {
    /// `geometry` must already be in lon/lat. Nothing is mounted until the first refresh lands.
    pub fn new(geometry: FeatureCollection, config: AppConfig) -> Self {
        let renderer = MapRenderer::new(Styles::from(&config.style));
        AppState {
            geometry,
            store: TabularStore::default(),
            selection: Selection::All,
            field: MetricField::None,
            renderer,
            table: TableView::default(),
            viewport: overview(&config),
            config,
        }
    }

    pub fn geometry(&self) -> &FeatureCollection {
        &self.geometry
    }

    pub fn store(&self) -> &TabularStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn field(&self) -> MetricField {
        self.field
    }

    pub fn renderer(&self) -> &MapRenderer {
        &self.renderer
    }

    pub fn table(&self) -> &TableView {
        &self.table
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Filter dropdown entries: the sentinel, then district names alphabetically.
    pub fn filter_options(&self) -> Vec<String> {
        let mut options = vec![ALL_SENTINEL.to_string()];
        options.extend(self.geometry.sorted_names());
        options
    }

    pub fn dispatch(&mut self, command: Command) -> Vec<Effect> {
        debug!("Dispatching {}", command_name(&command));
        let mut effects = Vec::new();

        match command {
            Command::SetFilter(Selection::All) => {
                self.selection = Selection::All;
                self.renderer.render(&self.geometry);
                effects.push(Effect::Rendered);
                self.set_viewport(overview(&self.config), &mut effects);
            }
            Command::SetFilter(Selection::Districts(names)) => {
                let subset = self.geometry.filter(&names);
                if subset.len() < names.len() {
                    warn!("{} of {} selected districts have no geometry", names.len() - subset.len(), names.len());
                }
                self.selection = Selection::Districts(names);
                self.renderer.render(&subset);
                effects.push(Effect::Rendered);

                if let Some(bounds) = self.renderer.overlay().bounds() {
                    let viewport = Viewport::FitBounds {
                        south_west: [bounds.min().y, bounds.min().x],
                        north_east: [bounds.max().y, bounds.max().x],
                        padding: self.config.map.fit_padding,
                    };
                    self.set_viewport(viewport, &mut effects);
                }
            }
            Command::SetField(field) => {
                self.field = field;
                if self.config.map.field_change_resets_filter {
                    self.selection = Selection::All;
                }
                self.render_selection();
                effects.push(Effect::Rendered);
            }
            Command::Refresh => {
                let sequence = self.store.begin_refresh();
                effects.push(Effect::Fetch { sequence });
            }
            Command::RefreshCompleted { sequence, rows, at } => {
                if self.store.complete_refresh(sequence, rows, at) {
                    self.selection = Selection::All;
                    self.renderer.render(&self.geometry);
                    effects.push(Effect::Rendered);
                    self.table.rebuild(self.store.rows());
                    effects.push(Effect::TableUpdated);
                }
            }
            Command::RefreshFailed { sequence, error } => {
                warn!("Refresh #{} failed, keeping previous data: {}", sequence, error);
            }
            Command::SelectDistrict(name) => match self.renderer.highlight(&name, self.store.rows()) {
                Some(popup) => effects.push(Effect::OpenPopup(popup)),
                None => info!("District {} is not on the map", name),
            },
            Command::PointerEnter(name) => {
                if let Some(tooltip) = self.renderer.pointer_enter(&name, self.field, self.store.rows()) {
                    effects.push(Effect::ShowTooltip(tooltip));
                }
            }
            Command::PointerLeave(name) => {
                self.renderer.pointer_leave(&name);
            }
            Command::ShowTable => self.table.visible = true,
            Command::HideTable => self.table.visible = false,
        }

        effects
    }

    fn render_selection(&mut self) {
        match &self.selection {
            Selection::All => self.renderer.render(&self.geometry),
            Selection::Districts(names) => {
                let subset = self.geometry.filter(names);
                self.renderer.render(&subset);
            }
        }
    }

    fn set_viewport(&mut self, viewport: Viewport, effects: &mut Vec<Effect>) {
        self.viewport = viewport.clone();
        effects.push(Effect::ViewportChanged(viewport));
    }
}

fn overview(config: &AppConfig) -> Viewport {
    Viewport::Overview { center: config.map.center, zoom: config.map.zoom }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::SetFilter(_) => "SetFilter",
        Command::SetField(_) => "SetField",
        Command::Refresh => "Refresh",
        Command::RefreshCompleted { .. } => "RefreshCompleted",
        Command::RefreshFailed { .. } => "RefreshFailed",
        Command::SelectDistrict(_) => "SelectDistrict",
        Command::PointerEnter(_) => "PointerEnter",
        Command::PointerLeave(_) => "PointerLeave",
        Command::ShowTable => "ShowTable",
        Command::HideTable => "HideTable",
    }
}
