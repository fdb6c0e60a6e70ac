use oso::PolarClass;

/// Resource for actions that are not tied to a single ride: booking, driving,
/// pricing changes and public lookups. Rules match on the class alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct Platform;

impl PolarClass for Platform {
    fn get_polar_class_builder() -> oso::ClassBuilder<Platform> {
        oso::Class::builder().name("Platform")
    }

    fn get_polar_class() -> oso::Class {
        Platform::get_polar_class_builder().build()
    }
}
