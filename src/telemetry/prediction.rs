#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub human_count: f32,

    pub ventilation_state: i32,
}
