pub mod constraint;
pub mod damped_spring;
pub mod pin_joint;
