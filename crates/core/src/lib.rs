//! Moving-object segmentation over live or recorded video.
//!
//! Frames flow from a [`acquisition`] source through a background model
//! ([`modeling`]), mask cleanup and compositing ([`segmentation`]) into a
//! [`presentation`] sink, driven by [`pipeline::pipeline_driver::PipelineDriver`].

pub mod shared {
    pub mod constants;
    pub mod error;
    pub mod frame;
    pub mod mask;
    pub mod sample_resolver;
    pub mod settings;
    pub mod video_metadata;
}

pub mod acquisition {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure;
}

pub mod modeling {
    pub mod domain {
        pub mod background_model;
        pub mod model_config;
    }
    pub mod infrastructure;
}

pub mod segmentation {
    pub mod domain {
        pub mod frame_compositor;
        pub mod mask_processor;
        pub mod morphology;
    }
}

pub mod presentation {
    pub mod domain {
        pub mod frame_presenter;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod pipeline_driver;
    pub mod pipeline_logger;
    pub mod segment_stream_use_case;
}
