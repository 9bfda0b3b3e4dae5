//! Live camera acquisition with object detection and hand landmark overlays.
//!
//! Each bounded context is split into `domain` (traits and value types) and
//! `infrastructure` (camera SDKs, ONNX Runtime, ffmpeg, windowing).

pub mod shared {
    pub mod camera_info;
    pub mod constants;
    pub mod frame;
    pub mod geometry;
    pub mod model_resolver;
    pub mod settings;
}

pub mod camera {
    pub mod domain {
        pub mod camera_source;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod hand_landmarker;
        pub mod object_detector;
    }
    pub mod infrastructure;
}

pub mod overlay {
    pub mod domain {
        pub mod frame_presenter;
    }
    pub mod glyphs;
    pub mod infrastructure;
    pub mod overlay_renderer;
}

pub mod pipeline {
    pub mod coordinate_remapper;
    pub mod frame_scaler;
    pub mod frame_throttle;
    pub mod session_config;
    pub mod session_controller;
    pub mod session_error;
    pub mod session_logger;
}

pub mod video {
    pub mod domain {
        pub mod video_writer;
    }
    pub mod infrastructure;
}
