//! Well-known label keys and finalizer names shared by the controllers.

/// API group of all spotcluster resources
pub const API_GROUP: &str = "spotcluster.io";

/// Label carrying the name of the owning Pool on an Instance
pub const POOL_NAME_LABEL: &str = "pool.spotcluster.io/name";

/// Label carrying the UID of the owning Pool on an Instance
pub const POOL_UID_LABEL: &str = "pool.spotcluster.io/uid";

/// Label carrying the provider-assigned identifier of the backing droplet
pub const INSTANCE_ID_LABEL: &str = "instance.spotcluster.io/id";

/// Finalizer held on a Pool until all of its Instances are gone
pub const POOL_FINALIZER: &str = "spotcluster.io/pool-protection";

/// Finalizer held on an Instance until its droplet and node are torn down
pub const INSTANCE_FINALIZER: &str = "spotcluster.io/instance-protection";
