// src/models.rs

use serde::{Deserialize, Serialize};

/// Label vocabulary the vision model is allowed to answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteLabel {
    PlasticBottle,
    AluminumCan,
    GlassJar,
    CleanCardboard,
    PizzaBoxGreasy,
    FoodWaste,
    PlasticBag,
    TrashOther,
}

impl WasteLabel {
    pub const ALL: [WasteLabel; 8] = [
        WasteLabel::PlasticBottle,
        WasteLabel::AluminumCan,
        WasteLabel::GlassJar,
        WasteLabel::CleanCardboard,
        WasteLabel::PizzaBoxGreasy,
        WasteLabel::FoodWaste,
        WasteLabel::PlasticBag,
        WasteLabel::TrashOther,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteLabel::PlasticBottle => "plastic_bottle",
            WasteLabel::AluminumCan => "aluminum_can",
            WasteLabel::GlassJar => "glass_jar",
            WasteLabel::CleanCardboard => "clean_cardboard",
            WasteLabel::PizzaBoxGreasy => "pizza_box_greasy",
            WasteLabel::FoodWaste => "food_waste",
            WasteLabel::PlasticBag => "plastic_bag",
            WasteLabel::TrashOther => "trash_other",
        }
    }

    /// `pizza_box_greasy` -> `pizza box greasy`
    pub fn display_name(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

/// Where a classified item should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Recycle,
    Compost,
    Landfill,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Recycle => "recycle",
            Route::Compost => "compost",
            Route::Landfill => "landfill",
        }
    }
}

fn default_weight_kg() -> f64 {
    0.1
}

/// One item found in an uploaded photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteItem {
    pub label: WasteLabel,
    pub route: Route,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_weight_kg")]
    pub est_weight_kg: f64,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

impl WasteItem {
    pub fn new(label: WasteLabel, route: Route, confidence: f64, est_weight_kg: f64) -> Self {
        Self {
            label,
            route,
            confidence,
            est_weight_kg,
            source: String::new(),
            object_key: None,
            tip: None,
        }
    }

    /// The item substituted when the vision model cannot be used.
    pub fn fallback() -> Self {
        Self::new(WasteLabel::PlasticBottle, Route::Recycle, 0.9, 0.03)
    }

    /// Pull model-supplied numbers back into range.
    pub fn clamped(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if !self.est_weight_kg.is_finite() || self.est_weight_kg < 0.0 {
            self.est_weight_kg = 0.0;
        }
        self
    }
}
