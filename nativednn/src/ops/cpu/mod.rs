pub mod avg_pool;
pub mod conv2d;
pub mod dense;
pub mod depth_to_space;
pub mod identity;
pub mod math_binary;
pub mod math_unary;
pub mod maximum;
pub mod mirror_pad;
