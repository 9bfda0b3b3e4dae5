pub mod execution_provider;
pub mod letterbox;
pub mod math;
pub mod onnx_hand_landmarker;
pub mod onnx_yolo_detector;
