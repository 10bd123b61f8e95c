mod mesh;
mod spatial_index;
mod view;
