mod composite;
mod field_cache;
mod mesh;
