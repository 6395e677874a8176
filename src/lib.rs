#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

pub use vc_reflect as reflect;
pub use vc_serial as serial;
pub use vc_utils as utils;
