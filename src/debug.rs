use crate::perception::PerceivedVehicle;
use crate::VehicleId;
#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

/// Records that `ego` perceived a neighbour.
#[allow(unused)]
pub fn debug_neighbor(name: &str, ego: VehicleId, neighbor: &PerceivedVehicle) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "neighbor",
            "name": name,
            "ego": ego,
            "neighbor": neighbor.id(),
            "distance": neighbor.distance(),
            "speed": neighbor.speed(),
            "acc": neighbor.acc(),
            "parallel": neighbor.is_parallel(),
        }))
    })
}

#[cfg(feature = "debug")]
pub fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
